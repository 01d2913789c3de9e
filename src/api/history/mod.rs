// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prediction history endpoints
//!
//! Provides GET /history and GET /history/{user_id}.

pub mod handler;

pub use handler::{history_handler, user_history_handler};
