use crate::standardized_types::new_types::Price;
use crate::standardized_types::symbols::Symbol;
use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;

/// Common view over every market data shape. Times are stored canonical UTC,
/// already converted from the data time zone by the codec that produced them.
/// `end_time` is the instant a point becomes known, which is the slice time
/// it is delivered at.
pub trait BaseData {
    fn symbol(&self) -> &Symbol;

    /// Bar open time or event time.
    fn time(&self) -> DateTime<Utc>;

    /// The instant the point becomes known. Equals `time` for ticks and
    /// auxiliary events, `time + resolution` for bars.
    fn end_time(&self) -> DateTime<Utc>;

    /// Representative price, bar close for bars, trade price for ticks.
    fn value(&self) -> Price;

    fn time_local(&self, time_zone: &Tz) -> DateTime<FixedOffset> {
        crate::helpers::converters::time_convert_utc_to_fixed_offset(time_zone, self.time())
    }

    fn end_time_local(&self, time_zone: &Tz) -> DateTime<FixedOffset> {
        crate::helpers::converters::time_convert_utc_to_fixed_offset(time_zone, self.end_time())
    }
}
