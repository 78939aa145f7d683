//! HTTP ingress.
//!
//! Three routes: `POST /v1/sms/send` admits a message, `GET /v1/sms/log`
//! pages a customer's status rows, `GET /v1/sms/:id` shows one message's
//! timeline. Authentication is two headers supplied by the upstream API
//! gateway: `X-Api-Key` (plan lookup) and `X-Auth-User-Id` (customer ID).

mod auth;
mod error;
mod handlers;
mod idempotency;
mod pagination;
mod server;

pub use auth::Caller;
pub use error::ApiError;
pub use idempotency::IdempotencyGuard;
pub use pagination::Paginate;
pub use server::{router, serve, ApiState};
