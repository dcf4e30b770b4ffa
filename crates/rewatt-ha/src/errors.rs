// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Rewatt.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Error types for the Home Assistant client

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HaError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("HA API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type HaResult<T> = std::result::Result<T, HaError>;
