// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod api;
pub mod cache;
pub mod cell;
pub mod color;
pub mod error;
pub mod field_kind;
pub mod forms;
pub mod ids;
pub mod model;
pub mod protocol;
pub mod remote;
pub mod state;
pub mod viewport;

pub use api::*;
pub use cache::*;
pub use cell::*;
pub use error::*;
pub use forms::*;
pub use ids::*;
pub use model::*;
pub use protocol::*;
pub use remote::*;
pub use state::*;
pub use viewport::*;
