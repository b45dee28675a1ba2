pub mod csv_cache;
pub mod metadata_cache;
pub mod schema_cache;

pub use csv_cache::CsvCache;
pub use csv_cache::CsvToolRow;
pub use metadata_cache::MetadataCache;
pub use schema_cache::SchemaCache;
