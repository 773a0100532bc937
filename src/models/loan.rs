//! Loan model and lifecycle arithmetic.
//!
//! A loan moves through two states: `borrowed` at creation, `returned`
//! exactly once at return. Due dates default to a 14-day period; overdue is
//! never stored, it is derived from the effective due date at read time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;

use super::book::BookDetails;
use super::user::UserSummary;

/// Default loan period applied when no due date is supplied
pub const LOAN_PERIOD_DAYS: i64 = 14;

/// Loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Borrowed,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "borrowed",
            LoanStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "borrowed" => Ok(LoanStatus::Borrowed),
            "returned" => Ok(LoanStatus::Returned),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

// SQLx conversion for LoanStatus (stored as text)
impl sqlx::Type<Postgres> for LoanStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for LoanStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <String as Encode<Postgres>>::encode(self.as_str().to_string(), buf)
    }
}

/// Loan model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub loan_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// The due date in force: the stored one, or loan date + 14 days when absent
    pub fn effective_due_date(&self) -> DateTime<Utc> {
        self.due_date
            .unwrap_or(self.loan_date + Duration::days(LOAN_PERIOD_DAYS))
    }

    /// Whether the loan is overdue at `now`. Returned loans are never overdue.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status == LoanStatus::Borrowed && now > self.effective_due_date()
    }

    /// The due date after an extension, anchored to the current effective due
    /// date rather than to the clock.
    pub fn extended_due_date(&self, extension_days: i64) -> DateTime<Utc> {
        self.effective_due_date() + Duration::days(extension_days)
    }
}

/// Loan with user and book populated, as returned by all read operations
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanDetails {
    pub id: i32,
    pub user: UserSummary,
    pub book: BookDetails,
    pub loan_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub is_overdue: bool,
}

/// Create loan request
#[derive(Debug, Deserialize)]
pub struct CreateLoan {
    pub user_id: i32,
    pub book_id: i32,
    pub due_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn loan(due_date: Option<DateTime<Utc>>, status: LoanStatus) -> Loan {
        let loan_date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Loan {
            id: 1,
            user_id: 1,
            book_id: 1,
            loan_date,
            due_date,
            return_date: None,
            status,
            created_at: loan_date,
            updated_at: loan_date,
        }
    }

    #[test]
    fn effective_due_date_defaults_to_14_days() {
        let l = loan(None, LoanStatus::Borrowed);
        assert_eq!(l.effective_due_date(), l.loan_date + Duration::days(14));
    }

    #[test]
    fn effective_due_date_prefers_stored_value() {
        let due = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let l = loan(Some(due), LoanStatus::Borrowed);
        assert_eq!(l.effective_due_date(), due);
    }

    #[test]
    fn overdue_one_second_past_due() {
        let due = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let l = loan(Some(due), LoanStatus::Borrowed);
        assert!(!l.is_overdue_at(due));
        assert!(l.is_overdue_at(due + Duration::seconds(1)));
    }

    #[test]
    fn returned_loan_is_never_overdue() {
        let due = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let l = loan(Some(due), LoanStatus::Returned);
        assert!(!l.is_overdue_at(due + Duration::days(100)));
    }

    #[test]
    fn overdue_without_due_date_uses_loan_period() {
        let l = loan(None, LoanStatus::Borrowed);
        assert!(!l.is_overdue_at(l.loan_date + Duration::days(14)));
        assert!(l.is_overdue_at(l.loan_date + Duration::days(14) + Duration::seconds(1)));
    }

    #[test]
    fn extension_is_anchored_to_due_date_not_now() {
        // Due in 3 days, extended by 7: new due date is exactly due + 7 days,
        // regardless of the current time.
        let due = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        let l = loan(Some(due), LoanStatus::Borrowed);
        assert_eq!(l.extended_due_date(7), due + Duration::days(7));
    }

    #[test]
    fn extension_without_due_date_extends_the_default() {
        let l = loan(None, LoanStatus::Borrowed);
        assert_eq!(
            l.extended_due_date(7),
            l.loan_date + Duration::days(14 + 7)
        );
    }

    #[test]
    fn status_round_trips_through_str() {
        assert_eq!("borrowed".parse::<LoanStatus>().unwrap(), LoanStatus::Borrowed);
        assert_eq!("Returned".parse::<LoanStatus>().unwrap(), LoanStatus::Returned);
        assert!("lost".parse::<LoanStatus>().is_err());
    }
}
