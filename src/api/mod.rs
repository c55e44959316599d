pub mod error;
pub mod graphql;
pub mod rest;
pub mod serializers;
pub mod views;
