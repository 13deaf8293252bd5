//! Data Transfer Objects for status API responses.

pub mod server_dto;

pub use server_dto::*;
