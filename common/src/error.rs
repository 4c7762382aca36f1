//! Categorical error taxonomy shared by all four services.
//!
//! Every failure a handler can produce is one of the fixed codes below; each
//! carries its own HTTP status per spec section 7. `ServiceError` never leaks
//! internal detail (SQL fragments, file paths, stack traces) into the
//! response body - only `message` (operator-facing, hand-written at the call
//! site) and an optional `details` object reach the wire.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidJws,
    InvalidJson,
    UnsupportedMediaType,
    PayloadTooLarge,
    MethodNotAllowed,

    Forbidden,

    InvalidPayload,
    InvalidTaskId,
    InvalidReward,
    InvalidDeadline,
    TitleTooLong,
    InvalidReason,
    InvalidWorkerPct,
    InvalidAmount,
    InvalidCategory,
    InvalidRating,
    CommentTooLong,
    SelfFeedback,
    SelfBid,
    MissingField,
    InvalidFieldType,
    TokenMismatch,
    PayloadMismatch,
    NoFile,

    AccountNotFound,
    AgentNotFound,
    TaskNotFound,
    BidNotFound,
    AssetNotFound,
    EscrowNotFound,
    DisputeNotFound,
    FeedbackNotFound,

    InvalidStatus,
    TaskAlreadyExists,
    BidAlreadyExists,
    AccountExists,
    AgentExists,
    EscrowAlreadyLocked,
    EscrowAlreadyResolved,
    DisputeAlreadyExists,
    DisputeAlreadyRuled,
    RebuttalAlreadySubmitted,
    InvalidDisputeStatus,
    NoAssets,
    TooManyAssets,
    FileTooLarge,
    FeedbackExists,
    InsufficientFunds,

    IdentityServiceUnavailable,
    CentralBankUnavailable,
    TaskBoardUnavailable,
    ReputationServiceUnavailable,
    JudgeUnavailable,

    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        use ErrorCode::*;
        match self {
            InvalidJws => "INVALID_JWS",
            InvalidJson => "INVALID_JSON",
            UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Forbidden => "FORBIDDEN",
            InvalidPayload => "INVALID_PAYLOAD",
            InvalidTaskId => "INVALID_TASK_ID",
            InvalidReward => "INVALID_REWARD",
            InvalidDeadline => "INVALID_DEADLINE",
            TitleTooLong => "TITLE_TOO_LONG",
            InvalidReason => "INVALID_REASON",
            InvalidWorkerPct => "INVALID_WORKER_PCT",
            InvalidAmount => "INVALID_AMOUNT",
            InvalidCategory => "INVALID_CATEGORY",
            InvalidRating => "INVALID_RATING",
            CommentTooLong => "COMMENT_TOO_LONG",
            SelfFeedback => "SELF_FEEDBACK",
            SelfBid => "SELF_BID",
            MissingField => "MISSING_FIELD",
            InvalidFieldType => "INVALID_FIELD_TYPE",
            TokenMismatch => "TOKEN_MISMATCH",
            PayloadMismatch => "PAYLOAD_MISMATCH",
            NoFile => "NO_FILE",
            AccountNotFound => "ACCOUNT_NOT_FOUND",
            AgentNotFound => "AGENT_NOT_FOUND",
            TaskNotFound => "TASK_NOT_FOUND",
            BidNotFound => "BID_NOT_FOUND",
            AssetNotFound => "ASSET_NOT_FOUND",
            EscrowNotFound => "ESCROW_NOT_FOUND",
            DisputeNotFound => "DISPUTE_NOT_FOUND",
            FeedbackNotFound => "FEEDBACK_NOT_FOUND",
            InvalidStatus => "INVALID_STATUS",
            TaskAlreadyExists => "TASK_ALREADY_EXISTS",
            BidAlreadyExists => "BID_ALREADY_EXISTS",
            AccountExists => "ACCOUNT_EXISTS",
            AgentExists => "AGENT_EXISTS",
            EscrowAlreadyLocked => "ESCROW_ALREADY_LOCKED",
            EscrowAlreadyResolved => "ESCROW_ALREADY_RESOLVED",
            DisputeAlreadyExists => "DISPUTE_ALREADY_EXISTS",
            DisputeAlreadyRuled => "DISPUTE_ALREADY_RULED",
            RebuttalAlreadySubmitted => "REBUTTAL_ALREADY_SUBMITTED",
            InvalidDisputeStatus => "INVALID_DISPUTE_STATUS",
            NoAssets => "NO_ASSETS",
            TooManyAssets => "TOO_MANY_ASSETS",
            FileTooLarge => "FILE_TOO_LARGE",
            FeedbackExists => "FEEDBACK_EXISTS",
            InsufficientFunds => "INSUFFICIENT_FUNDS",
            IdentityServiceUnavailable => "IDENTITY_SERVICE_UNAVAILABLE",
            CentralBankUnavailable => "CENTRAL_BANK_UNAVAILABLE",
            TaskBoardUnavailable => "TASK_BOARD_UNAVAILABLE",
            ReputationServiceUnavailable => "REPUTATION_SERVICE_UNAVAILABLE",
            JudgeUnavailable => "JUDGE_UNAVAILABLE",
            Internal => "INTERNAL_ERROR",
        }
    }

    pub fn status(self) -> StatusCode {
        use ErrorCode::*;
        match self {
            InvalidJws | InvalidJson | InvalidPayload | InvalidTaskId | InvalidReward
            | InvalidDeadline | TitleTooLong | InvalidReason | InvalidWorkerPct
            | InvalidAmount | InvalidCategory | InvalidRating | CommentTooLong | SelfFeedback
            | SelfBid | MissingField | InvalidFieldType | TokenMismatch | PayloadMismatch
            | NoFile => StatusCode::BAD_REQUEST,
            UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Forbidden => StatusCode::FORBIDDEN,
            AccountNotFound | AgentNotFound | TaskNotFound | BidNotFound | AssetNotFound
            | EscrowNotFound | DisputeNotFound | FeedbackNotFound => StatusCode::NOT_FOUND,
            InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            InvalidStatus | TaskAlreadyExists | BidAlreadyExists | AccountExists | AgentExists
            | EscrowAlreadyLocked | EscrowAlreadyResolved | DisputeAlreadyExists
            | DisputeAlreadyRuled | RebuttalAlreadySubmitted | InvalidDisputeStatus
            | NoAssets | TooManyAssets | FileTooLarge | FeedbackExists => StatusCode::CONFLICT,
            IdentityServiceUnavailable | CentralBankUnavailable | TaskBoardUnavailable
            | ReputationServiceUnavailable | JudgeUnavailable => StatusCode::BAD_GATEWAY,
            Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The wire shape every error response shares, per spec section 6.2.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub details: Value,
}

#[derive(Debug)]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message.into())
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ServiceError {}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(code = self.code.as_str(), message = %self.message, "internal error");
        }
        let body = ErrorBody {
            error: self.code.as_str(),
            message: self.message,
            details: self.details,
        };
        (status, Json(body)).into_response()
    }
}

/// Blanket conversion for unexpected `sqlx` failures: never surface the SQL
/// error text itself, only log it.
impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "unexpected database error");
        ServiceError::internal("internal storage error")
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
