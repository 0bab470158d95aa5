use uuid::Uuid;

use crate::bonus::SessionState;

/// A single request was rejected. Other rounds are unaffected.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProtocolViolation {
    #[error("nonce {nonce} already used or not greater than last nonce {last}")]
    NonceReuse { nonce: u64, last: u64 },
    #[error("nonce {0} leaves no room for a later respin nonce")]
    NonceExhausted(u64),
    #[error("bonus session is {state:?}, not active")]
    SessionNotActive { state: SessionState },
    #[error("bonus session already started")]
    SessionNotIdle,
    #[error("{count} trigger symbols is below the threshold of {threshold}")]
    BonusNotTriggered { count: usize, threshold: usize },
    #[error("session grid sticky positions do not match the server session")]
    StickyGridMismatch,
    #[error("session grid has {len} slots")]
    MalformedSessionGrid { len: usize },
    #[error("client seed differs from the one the round was played with")]
    ClientSeedMismatch,
    #[error("bet {got} differs from the round bet {expected}")]
    BetMismatch { expected: f64, got: f64 },
    #[error("bet must be a positive finite amount, got {0}")]
    InvalidBet(f64),
    #[error("client seed must not be empty")]
    EmptyClientSeed,
    #[error("server secret does not match the session commitment")]
    SecretMismatch,
    #[error("unknown round {0}")]
    UnknownRound(Uuid),
    #[error("round {0} is already being advanced by another request")]
    RoundBusy(Uuid),
    #[error("round {0} already has its spin")]
    SpinAlreadyPlayed(Uuid),
    #[error("round {0} has a bonus session in progress")]
    BonusInProgress(Uuid),
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
    #[error("fairness verification failed: {0}")]
    VerificationMismatch(String),
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }

    pub fn protocol(&self) -> Option<&ProtocolViolation> {
        match self {
            EngineError::Protocol(p) => Some(p),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
