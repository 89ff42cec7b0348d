//! Authenticated session layer for Pitstop.
//!
//! This crate provides:
//! - Token inspection (expiry, refresh window) without signature checks
//! - Single-flight credential refresh shared by every caller
//! - A request gateway that refreshes ahead of expiry and retries a 401 once
//! - An FSM-backed session controller (hydrate, login, register, logout)

mod api;
mod config;
mod error;
mod gateway;
mod refresh;
mod session;
mod session_fsm;
pub mod token;

pub use api::{
    AuthApi, HttpAuthApi, LoginData, LoginRequest, LoginResponse, RefreshGrant,
    RegistrationRequest, RegistrationResponse, Role,
};
pub use config::SessionConfig;
pub use error::{AuthError, AuthResult, RefreshError, RefreshFailure};
pub use gateway::{
    ApiRequest, ApiResponse, GatewayError, GatewayResult, HttpTransport, ReqwestTransport,
    RequestGateway, UNAUTHORIZED,
};
pub use refresh::RefreshCoordinator;
pub use session::{AuthenticatedUser, RegistrationReceipt, SessionController, SessionSnapshot};
pub use session_fsm::{session_machine, SessionMachine, SessionMachineInput, SessionMachineState, SessionStatus};

// Re-exported so consumers can name `Method` without depending on reqwest.
pub use reqwest::Method;
