//! Authentication and authorization core
//!
//! - [`jwt`]: access/refresh token codec with separate secrets and audiences
//! - [`password`]: Argon2id hashing and strength rules
//! - [`repository`]: the credential store seam and its PostgreSQL adapter
//! - [`service`]: login, registration, refresh, logout, password reset, moderation
//! - [`gate`]: unverified, store-free filter on protected prefixes
//! - [`guard`]: verified, store-backed check behind every admin route

pub mod gate;
pub mod guard;
pub mod jwt;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;
pub mod transport;

pub use gate::{gate_middleware, GateDecision, GateIdentity, GateRejection, RequestGate};
pub use guard::{guard_middleware, Denial, GuardState, RouteGuard, Session};
pub use jwt::{Identity, IssuedToken, JwtError, TokenCodec};
pub use password::{hash_password, validate_password_strength, verify_password, PasswordConfig};
pub use repository::{CredentialStore, PgCredentialStore, RepositoryError};
pub use service::{AuthService, LoginOutcome, ResetMailer, TracingMailer};
