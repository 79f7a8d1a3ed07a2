use crate::errors::EngineError;
use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::new_types::Price;
use crate::standardized_types::symbols::Symbol;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;

/// User supplied data: an opaque payload plus the fields the engine needs to
/// schedule it. Payload interpretation belongs to the registered decoder,
/// the runtime never reflects over user types.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct CustomData {
    pub symbol: Symbol,
    pub type_name: String,
    pub time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub value: Price,
    pub payload: String,
}

impl BaseData for CustomData {
    fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    fn value(&self) -> Price {
        self.value
    }
}

/// Turns one raw line from a user data file into a `CustomData` point.
pub type CustomDecoder =
    Arc<dyn Fn(&Symbol, &str) -> Result<CustomData, EngineError> + Send + Sync>;

/// Registry of user decoders keyed by type name. Registered during
/// `initialize`, read by the file sources that service custom subscriptions.
#[derive(Clone, Default)]
pub struct CustomDecoderRegistry {
    decoders: AHashMap<String, CustomDecoder>,
}

impl CustomDecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: &str, decoder: CustomDecoder) {
        self.decoders.insert(type_name.to_string(), decoder);
    }

    pub fn get(&self, type_name: &str) -> Option<CustomDecoder> {
        self.decoders.get(type_name).cloned()
    }
}
