// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

/// Failure taxonomy of the record service. Every remote call resolves to
/// one of these, never to a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(format!("{error:#}"))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Rejection raised when a raw value does not fit a field's value domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("{0} fields hold text")]
    ExpectedText(&'static str),

    #[error("checkbox fields hold true or false")]
    ExpectedBool,

    #[error("invalid date {0:?}; use YYYY-MM-DD")]
    InvalidDate(String),

    #[error("{0:?} is not an option of this field")]
    UnknownOption(String),
}

impl From<ValueError> for ApiError {
    fn from(error: ValueError) -> Self {
        Self::BadRequest(error.to_string())
    }
}
