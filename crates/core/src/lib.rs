// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nh-core: shared primitives for the nixherd proxy and controller.

pub mod health;
pub mod session;
pub mod validate;

pub use health::{health_router, serve_health, ReadyState};
pub use session::{SessionId, SessionStatus};
pub use validate::{validate_session_id, SessionIdError, SESSION_ID_MAX_LEN};
