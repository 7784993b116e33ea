use std::fmt::Display;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdaError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("API error {code}: {message}")]
    Api {
        message: String,
        code: i64,
        errors: Option<ErrorDetails>,
    },
    #[error("Unparseable response with status code: {0}")]
    UnparseableResponse(i32),
    #[error("Cache miss: {0}")]
    CacheMiss(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Field level validation errors carried by API error payloads.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ErrorDetails {
    pub api_key: Option<Vec<String>>,
    pub authtoken: Option<Vec<String>>,
    pub access_token: Option<Vec<String>>,
    pub environment: Option<Vec<String>>,
    pub uid: Option<Vec<String>>,
}

/// Wire shape of a structured API error body.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error_message: String,
    pub error_code: i64,
    #[serde(default)]
    pub errors: Option<ErrorDetails>,
}

impl From<ApiErrorBody> for CdaError {
    fn from(body: ApiErrorBody) -> Self {
        CdaError::Api {
            message: body.error_message,
            code: body.error_code,
            errors: body.errors,
        }
    }
}

pub trait AddContext<T, E>: Context<T, E> {
    fn err_context<C: Display + Send + Sync + 'static>(self, msg: C) -> Result<T, anyhow::Error>
    where
        Self: Sized,
    {
        self.with_context(|| msg.to_string())
    }
}

impl<U, T, E> AddContext<T, E> for U where U: Context<T, E> {}

pub fn gen<T: AsRef<str>>(msg: T) -> anyhow::Error {
    anyhow!(msg.as_ref().to_string())
}
