//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS
//! 5. Session layer (tower-sessions with `PostgreSQL` store)
//! 6. Rate limiting (governor), per route group
//!
//! The Stripe webhook sits outside the session layer and the rate limiters.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use auth::{AdminAuth, OptionalAuth, RequireAuth, set_current_user};
pub use rate_limit::{api_rate_limiter, strict_rate_limiter};
pub use request_id::request_id_middleware;
pub use session::{create_session_layer, session_layer};
