//! Error taxonomy for the simulation core.
//!
//! Kinds, not class names: each variant names a *failure mode*, not a module.
//! `CapacityRejection` is deliberately not a variant here — riders that don't
//! fit are a normal outcome, not a failure, and are represented as a plain
//! return value: the reservoir's `query_for_vehicle` simply returns fewer
//! candidates than seats available, and excess riders stay `WAITING`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("data store error: {0}")]
    DataStore(String),

    #[error("bus request timed out after {0:?}")]
    BusTimeout(std::time::Duration),

    #[error("illegal state transition: {0}")]
    State(String),
}

impl SimError {
    pub fn geometry(msg: impl Into<String>) -> Self {
        SimError::Geometry(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        SimError::Config(msg.into())
    }

    pub fn data_store(msg: impl Into<String>) -> Self {
        SimError::DataStore(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        SimError::State(msg.into())
    }
}

impl From<reqwest::Error> for SimError {
    fn from(err: reqwest::Error) -> Self {
        SimError::DataStore(err.to_string())
    }
}

pub type SimResult<T> = Result<T, SimError>;
