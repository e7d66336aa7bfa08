//! Time-windowed spending reports

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;

use crate::expense::{Category, Expense, PaymentMethod};

/// 集計期間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    /// The last seven days up to now
    Weekly,
    /// From the first day of the current month
    Monthly,
    /// From January 1 of the current year
    Yearly,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Weekly, Window::Monthly, Window::Yearly];

    /// Lower bound of the window, in `now`'s time zone.
    pub fn start<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let date = now.date_naive();
        let first_day = match self {
            Window::Weekly => return now.clone() - Duration::days(7),
            Window::Monthly => date - Duration::days(i64::from(date.day0())),
            Window::Yearly => date - Duration::days(i64::from(date.ordinal0())),
        };
        local_midnight(&now.timezone(), first_day).unwrap_or_else(|| now.clone())
    }

    /// `start <= instant <= now`
    pub fn contains<Tz: TimeZone>(&self, instant: &DateTime<Utc>, now: &DateTime<Tz>) -> bool {
        let start = self.start(now).with_timezone(&Utc);
        let end = now.with_timezone(&Utc);
        *instant >= start && *instant <= end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Window::Weekly => "Weekly",
            Window::Monthly => "Monthly",
            Window::Yearly => "Yearly",
        })
    }
}

// Midnight may not exist on DST-change days; take the earliest valid
// instant, else read the wall time as UTC.
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| Some(tz.from_utc_datetime(&naive)))
}

/// 支払い方法別合計
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PaymentTotals {
    pub cash: f64,
    pub credit_card: f64,
    pub debit_card: f64,
}

impl PaymentTotals {
    pub fn get(&self, method: PaymentMethod) -> f64 {
        match method {
            PaymentMethod::Cash => self.cash,
            PaymentMethod::CreditCard => self.credit_card,
            PaymentMethod::DebitCard => self.debit_card,
        }
    }

    fn add(&mut self, method: PaymentMethod, amount: f64) {
        match method {
            PaymentMethod::Cash => self.cash += amount,
            PaymentMethod::CreditCard => self.credit_card += amount,
            PaymentMethod::DebitCard => self.debit_card += amount,
        }
    }

    pub fn sum(&self) -> f64 {
        self.cash + self.credit_card + self.debit_card
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryTotal {
    pub category: Category,
    pub amount: f64,
}

/// 集計結果
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub window: Window,
    pub by_payment_method: PaymentTotals,
    /// Largest first; only categories that occur.
    pub by_category: Vec<CategoryTotal>,
    pub total: f64,
    /// Number of records inside the window
    pub count: usize,
}

impl Report {
    pub fn category_sum(&self) -> f64 {
        self.by_category.iter().map(|c| c.amount).sum()
    }

    pub fn category(&self, category: Category) -> f64 {
        self.by_category
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.amount)
            .unwrap_or(0.0)
    }
}

/// Totals the records of `snapshot` that fall inside `window` ending at `now`.
///
/// Undated records are never inside a window.
pub fn aggregate<Tz: TimeZone>(snapshot: &[Expense], window: Window, now: &DateTime<Tz>) -> Report {
    let mut by_payment_method = PaymentTotals::default();
    let mut by_category: Vec<CategoryTotal> = Vec::new();
    let mut total = 0.0;
    let mut count = 0;

    let included = snapshot.iter().filter(|e| {
        e.created_at
            .as_ref()
            .map_or(false, |t| window.contains(t, now))
    });
    for expense in included {
        by_payment_method.add(expense.payment_method, expense.amount);
        match by_category.iter_mut().find(|c| c.category == expense.category) {
            Some(entry) => entry.amount += expense.amount,
            None => by_category.push(CategoryTotal {
                category: expense.category,
                amount: expense.amount,
            }),
        }
        total += expense.amount;
        count += 1;
    }

    // sort_by is stable: equal totals keep first-seen order
    by_category.sort_by(|a, b| b.amount.partial_cmp(&a.amount).unwrap_or(Ordering::Equal));

    Report {
        window,
        by_payment_method,
        by_category,
        total,
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expense::RecordOrigin;
    use chrono::FixedOffset;

    const EPSILON: f64 = 1e-9;

    fn expense(
        amount: f64,
        method: PaymentMethod,
        category: Category,
        at: Option<DateTime<Utc>>,
    ) -> Expense {
        Expense {
            id: format!("{}-{:?}", amount, at),
            title: "t".to_string(),
            amount,
            payment_method: method,
            category,
            user_id: "u".to_string(),
            created_at: at,
            origin: RecordOrigin::Remote,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_weekly_boundary_is_inclusive() {
        let now = now();
        let edge = now - Duration::days(7);
        assert!(Window::Weekly.contains(&edge, &now));
        assert!(!Window::Weekly.contains(&(edge - Duration::seconds(1)), &now));
        assert!(Window::Weekly.contains(&now, &now));
        assert!(!Window::Weekly.contains(&(now + Duration::seconds(1)), &now));
    }

    #[test]
    fn test_month_and_year_start() {
        let now = now();
        assert_eq!(
            Window::Monthly.start(&now),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            Window::Yearly.start(&now),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_month_start_uses_local_zone() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        // 2024-04-01 03:00 in Tokyo is still March 31 in UTC
        let now = tokyo.with_ymd_and_hms(2024, 4, 1, 3, 0, 0).unwrap();
        let start = Window::Monthly.start(&now);
        assert_eq!(start, tokyo.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());

        let late_march_utc = Utc.with_ymd_and_hms(2024, 3, 31, 16, 0, 0).unwrap();
        assert!(Window::Monthly.contains(&late_march_utc, &now));
        let earlier = Utc.with_ymd_and_hms(2024, 3, 31, 14, 59, 59).unwrap();
        assert!(!Window::Monthly.contains(&earlier, &now));
    }

    #[test]
    fn test_totals_agree() {
        let now = now();
        let recent = Some(now - Duration::days(1));
        let snapshot = vec![
            expense(4.5, PaymentMethod::Cash, Category::Food, recent),
            expense(20.0, PaymentMethod::CreditCard, Category::Shopping, recent),
            expense(0.1, PaymentMethod::DebitCard, Category::Food, recent),
            expense(0.2, PaymentMethod::Cash, Category::Bills, recent),
            expense(99.0, PaymentMethod::Cash, Category::Travel, None),
            expense(50.0, PaymentMethod::Cash, Category::Travel, Some(now - Duration::days(30))),
        ];

        for window in Window::ALL {
            let report = aggregate(&snapshot, window, &now);
            assert!((report.total - report.by_payment_method.sum()).abs() < EPSILON);
            assert!((report.total - report.category_sum()).abs() < EPSILON);
        }

        let weekly = aggregate(&snapshot, Window::Weekly, &now);
        assert_eq!(weekly.count, 4);
        assert!((weekly.total - 24.8).abs() < EPSILON);
        assert!((weekly.by_payment_method.cash - 4.7).abs() < EPSILON);
        assert!((weekly.category(Category::Food) - 4.6).abs() < EPSILON);
        assert_eq!(weekly.category(Category::Travel), 0.0);

        let yearly = aggregate(&snapshot, Window::Yearly, &now);
        assert_eq!(yearly.count, 5);
        assert_eq!(yearly.by_category[0].category, Category::Travel);
    }

    #[test]
    fn test_category_ties_keep_first_seen_order() {
        let now = now();
        let at = Some(now);
        let snapshot = vec![
            expense(5.0, PaymentMethod::Cash, Category::Health, at),
            expense(10.0, PaymentMethod::Cash, Category::Bills, at),
            expense(5.0, PaymentMethod::Cash, Category::Education, at),
        ];
        let report = aggregate(&snapshot, Window::Weekly, &now);
        let order: Vec<Category> = report.by_category.iter().map(|c| c.category).collect();
        assert_eq!(order, vec![Category::Bills, Category::Health, Category::Education]);
    }

    #[test]
    fn test_empty_snapshot() {
        let report = aggregate(&[], Window::Monthly, &now());
        assert_eq!(report.total, 0.0);
        assert_eq!(report.count, 0);
        assert_eq!(report.by_payment_method, PaymentTotals::default());
        assert!(report.by_category.is_empty());
    }
}
