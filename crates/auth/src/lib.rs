//! `equiplend-auth` — pure authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: the API layer turns a bearer token into a
//! [`Caller`] and asks [`authorize`] before touching the lending service.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::{Operation, can_perform};
pub use principal::Caller;
pub use roles::Role;
