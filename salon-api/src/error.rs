use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use salon_catalog::ScheduleError;
use salon_core::BookingError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Booking(BookingError),
    Validation(String),
    NotFound(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Booking(err) => {
                let status = match err {
                    BookingError::InvalidSelection(_) | BookingError::MissingContactInfo(_) => StatusCode::BAD_REQUEST,
                    BookingError::NotFound(_) => StatusCode::NOT_FOUND,
                    BookingError::HoldExpired | BookingError::SlotNoLongerAvailable => StatusCode::GONE,
                    BookingError::SlotUnavailable
                    | BookingError::HoldAlreadyRedeemed
                    | BookingError::RedemptionInFlight
                    | BookingError::Superseded
                    | BookingError::NoActiveHold => StatusCode::CONFLICT,
                    BookingError::TransientFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, err.code(), err.to_string())
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Anyhow(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal Server Error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        match &self {
            AppError::Anyhow(err) => tracing::error!("Internal Server Error: {:#}", err),
            AppError::Booking(err) if err.is_retryable() => tracing::warn!("Store unavailable: {}", err),
            _ => {}
        }

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        Self::Booking(err)
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_errors_map_to_status() {
        let status = |e: BookingError| AppError::from(e).parts().0;
        assert_eq!(status(BookingError::HoldExpired), StatusCode::GONE);
        assert_eq!(status(BookingError::SlotUnavailable), StatusCode::CONFLICT);
        assert_eq!(status(BookingError::HoldAlreadyRedeemed), StatusCode::CONFLICT);
        assert_eq!(status(BookingError::MissingContactInfo("name".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(BookingError::transient("timeout")), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let (status, code, message) = AppError::from(anyhow::anyhow!("redis exploded")).parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "INTERNAL_ERROR");
        assert!(!message.contains("redis"));
    }
}
