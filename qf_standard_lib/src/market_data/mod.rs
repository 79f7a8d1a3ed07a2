pub mod codecs;
pub mod compression;
pub mod file_paths;
pub mod map_files;
pub mod sources;
