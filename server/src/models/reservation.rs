use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub movie_id: Uuid,
    pub showtime_id: Uuid,
    pub seats: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw body of `POST /reserve/add`. Every field is optional here so that missing
/// fields surface as validation errors rather than JSON rejections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservationRequest {
    pub user_id: Option<Uuid>,
    pub movie_id: Option<Uuid>,
    pub showtime_id: Option<Uuid>,
    #[serde(default)]
    pub seats: Vec<String>,
}

/// A booking that passed input validation and is ready for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub user_id: Uuid,
    /// When absent the showtime's movie is used.
    pub movie_id: Option<Uuid>,
    pub showtime_id: Uuid,
    pub seats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct MovieReservationCount {
    pub movie_id: Uuid,
    pub movie_title: String,
    pub reservation_count: i64,
    pub seat_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct MovieSeatTotal {
    pub title: String,
    pub seats_reserved: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueReport {
    pub total_seats_reserved: i64,
    pub revenue_per_movie: BTreeMap<String, Decimal>,
    pub total_revenue: Decimal,
}

impl RevenueReport {
    /// Flat pricing: every reserved seat is sold at `ticket_price`.
    pub fn from_totals(totals: &[MovieSeatTotal], ticket_price: Decimal) -> Self {
        let revenue_per_movie: BTreeMap<String, Decimal> = totals
            .iter()
            .map(|t| (t.title.clone(), ticket_price * Decimal::from(t.seats_reserved)))
            .collect();

        Self {
            total_seats_reserved: totals.iter().map(|t| t.seats_reserved).sum(),
            total_revenue: revenue_per_movie.values().copied().sum(),
            revenue_per_movie,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revenue_report_totals() {
        let totals = vec![
            MovieSeatTotal {
                title: "Inception".to_string(),
                seats_reserved: 3,
            },
            MovieSeatTotal {
                title: "Interstellar".to_string(),
                seats_reserved: 0,
            },
        ];

        let report = RevenueReport::from_totals(&totals, Decimal::new(750, 2));
        assert_eq!(report.total_seats_reserved, 3);
        assert_eq!(report.revenue_per_movie["Inception"], Decimal::new(2250, 2));
        assert_eq!(report.revenue_per_movie["Interstellar"], Decimal::ZERO);
        assert_eq!(report.total_revenue, Decimal::new(2250, 2));
    }

    #[test]
    fn test_reservation_request_tolerates_missing_fields() {
        let request: ReservationRequest = serde_json::from_str(r#"{"seats": ["A1"]}"#).unwrap();
        assert!(request.user_id.is_none());
        assert!(request.showtime_id.is_none());
        assert_eq!(request.seats, vec!["A1"]);
    }
}
