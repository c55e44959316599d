pub mod choices;
pub mod csv_import;
pub mod error;
pub mod filters;
pub mod forms;
pub mod host;
pub mod inventory;
pub mod models;
pub mod registry_service;
pub mod snapshot_store;
pub mod tables;
