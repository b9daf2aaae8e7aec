//! Database access: initialization, catalog maintenance, and the SQLite
//! implementation of the store traits

pub mod catalog;
pub mod init;
pub mod store;

pub use catalog::{
    import_catalog, insert_category, insert_facility, insert_space_type, CatalogFile,
    CatalogImport, NewFacility,
};
pub use init::{create_schema, init_database, SCHEMA_VERSION};
pub use store::SqliteStore;
