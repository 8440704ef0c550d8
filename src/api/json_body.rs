//! JSON request bodies that fail with the API error envelope
//!
//! `axum::Json` answers a bad body with a plain-text 400, 415 or 422. Every
//! body problem here is a 400 `validation_error` instead.

use axum::{
    Json, async_trait,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::Error;

/// Extractor for a JSON request body
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(status = %rejection.status(), "rejected request body");
                Err(Error::Validation(rejection.body_text()))
            }
        }
    }
}
