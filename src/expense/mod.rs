//! Expense domain model

mod record;

pub use record::{normalize_records, parse_instant, ExpenseRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::Error;

/// 支払い方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentMethod {
    #[default]
    Cash,
    CreditCard,
    DebitCard,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::Cash,
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::CreditCard => "CreditCard",
            PaymentMethod::DebitCard => "DebitCard",
        }
    }

    /// Accepts the stored names as well as the older form labels
    /// (`"Credit Card"`, `"credit"`, ...), ignoring case and separators.
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "cash" => Some(PaymentMethod::Cash),
            "creditcard" | "credit" => Some(PaymentMethod::CreditCard),
            "debitcard" | "debit" => Some(PaymentMethod::DebitCard),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// カテゴリー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Food,
    Transport,
    Shopping,
    Bills,
    Entertainment,
    Health,
    Education,
    Travel,
    Groceries,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Food,
        Category::Transport,
        Category::Shopping,
        Category::Bills,
        Category::Entertainment,
        Category::Health,
        Category::Education,
        Category::Travel,
        Category::Groceries,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Transport => "Transport",
            Category::Shopping => "Shopping",
            Category::Bills => "Bills",
            Category::Entertainment => "Entertainment",
            Category::Health => "Health",
            Category::Education => "Education",
            Category::Travel => "Travel",
            Category::Groceries => "Groceries",
            Category::Other => "Other",
        }
    }

    /// Case-insensitive lookup; `None` for names outside the enumeration.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw))
    }

    /// Legacy records without a usable category land in `Other`.
    pub fn parse_or_other(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or(Category::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record was first persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordOrigin {
    #[default]
    Remote,
    /// Written to the local store only because the remote was unreachable.
    Local,
}

/// 正規化された支出レコード
#[derive(Debug, Clone, PartialEq)]
pub struct Expense {
    pub id: String,
    pub title: String,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub category: Category,
    /// Owner scoping key
    pub user_id: String,
    /// Canonical time field; `None` marks an undated record.
    pub created_at: Option<DateTime<Utc>>,
    pub origin: RecordOrigin,
}

impl Expense {
    pub fn is_local(&self) -> bool {
        self.origin == RecordOrigin::Local
    }
}

/// Newest first; undated records go last, ties keep their order.
pub fn sort_newest_first(expenses: &mut [Expense]) {
    expenses.sort_by(|a, b| match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// 新規支出の入力
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpenseDraft {
    pub title: String,
    pub amount: Option<f64>,
    pub payment_method: PaymentMethod,
    pub category: Option<Category>,
}

impl ExpenseDraft {
    pub fn new(title: &str, amount: f64) -> Self {
        Self {
            title: title.to_string(),
            amount: Some(amount),
            ..Default::default()
        }
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Parses the leading number of a form field the way a browser
    /// `parseFloat` does: `"4.50 USD"` is `4.5`, `"abc"` is `None`.
    pub fn parse_amount(input: &str) -> Option<f64> {
        let s = input.trim_start();
        let bytes = s.as_bytes();
        let mut end = 0;

        if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
            end += 1;
        }
        let int_start = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        let mut digits = end - int_start;
        if end < bytes.len() && bytes[end] == b'.' {
            let frac_start = end + 1;
            let mut frac_end = frac_start;
            while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
                frac_end += 1;
            }
            digits += frac_end - frac_start;
            if digits > 0 {
                end = frac_end;
            }
        }
        if digits == 0 {
            return None;
        }
        if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
            let mut exp_end = end + 1;
            if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
                exp_end += 1;
            }
            let exp_digits_start = exp_end;
            while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                exp_end += 1;
            }
            if exp_end > exp_digits_start {
                end = exp_end;
            }
        }

        s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Checks required fields and returns the trimmed title, amount and category.
    pub(crate) fn validate(&self) -> Result<(String, f64, Category), Error> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(Error::validation("title is required"));
        }
        let amount = self
            .amount
            .filter(|a| a.is_finite())
            .ok_or_else(|| Error::validation("amount is required"))?;
        let category = self
            .category
            .ok_or_else(|| Error::validation("category is required"))?;
        Ok((title.to_string(), amount, category))
    }
}

/// 編集内容。指定されたフィールドのみ置き換える
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpensePatch {
    pub title: Option<String>,
    pub amount: Option<f64>,
    pub payment_method: Option<PaymentMethod>,
    pub category: Option<Category>,
}

impl ExpensePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Builds the replacement record. Identity, owner, time and origin are kept.
    pub(crate) fn apply(&self, current: &Expense) -> Result<Expense, Error> {
        let title = match &self.title {
            Some(title) if title.trim().is_empty() => {
                return Err(Error::validation("title is required"))
            }
            Some(title) => title.trim().to_string(),
            None => current.title.clone(),
        };
        let amount = match self.amount {
            Some(amount) if !amount.is_finite() => {
                return Err(Error::validation("amount is required"))
            }
            Some(amount) => amount,
            None => current.amount,
        };
        Ok(Expense {
            title,
            amount,
            payment_method: self.payment_method.unwrap_or(current.payment_method),
            category: self.category.unwrap_or(current.category),
            ..current.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn expense(id: &str, created_at: Option<DateTime<Utc>>) -> Expense {
        Expense {
            id: id.to_string(),
            title: id.to_string(),
            amount: 1.0,
            payment_method: PaymentMethod::Cash,
            category: Category::Food,
            user_id: "u".to_string(),
            created_at,
            origin: RecordOrigin::Remote,
        }
    }

    #[test]
    fn test_payment_method_aliases() {
        assert_eq!(PaymentMethod::parse("Cash"), Some(PaymentMethod::Cash));
        assert_eq!(PaymentMethod::parse("Credit Card"), Some(PaymentMethod::CreditCard));
        assert_eq!(PaymentMethod::parse("credit"), Some(PaymentMethod::CreditCard));
        assert_eq!(PaymentMethod::parse("DEBIT_CARD"), Some(PaymentMethod::DebitCard));
        assert_eq!(PaymentMethod::parse("DebitCard"), Some(PaymentMethod::DebitCard));
        assert_eq!(PaymentMethod::parse("cheque"), None);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(Category::parse("groceries"), Some(Category::Groceries));
        assert_eq!(Category::parse(" FOOD "), Some(Category::Food));
        assert_eq!(Category::parse("Pets"), None);
        assert_eq!(Category::parse_or_other(Some("Pets")), Category::Other);
        assert_eq!(Category::parse_or_other(None), Category::Other);
    }

    #[test]
    fn test_parse_amount_leading_number() {
        assert_eq!(ExpenseDraft::parse_amount("4.5"), Some(4.5));
        assert_eq!(ExpenseDraft::parse_amount("  12abc"), Some(12.0));
        assert_eq!(ExpenseDraft::parse_amount(".5"), Some(0.5));
        assert_eq!(ExpenseDraft::parse_amount("-3"), Some(-3.0));
        assert_eq!(ExpenseDraft::parse_amount("1e3x"), Some(1000.0));
        assert_eq!(ExpenseDraft::parse_amount("7."), Some(7.0));
        assert_eq!(ExpenseDraft::parse_amount("abc"), None);
        assert_eq!(ExpenseDraft::parse_amount(""), None);
        assert_eq!(ExpenseDraft::parse_amount("."), None);
    }

    #[test]
    fn test_draft_validation() {
        let ok = ExpenseDraft::new("  Coffee ", 4.5).with_category(Category::Food);
        assert_eq!(ok.validate().unwrap(), ("Coffee".to_string(), 4.5, Category::Food));

        let no_title = ExpenseDraft::new("   ", 4.5).with_category(Category::Food);
        assert!(matches!(no_title.validate(), Err(Error::Validation(_))));

        let no_amount = ExpenseDraft {
            title: "Coffee".to_string(),
            category: Some(Category::Food),
            ..Default::default()
        };
        assert!(matches!(no_amount.validate(), Err(Error::Validation(_))));

        let nan = ExpenseDraft::new("Coffee", f64::NAN).with_category(Category::Food);
        assert!(matches!(nan.validate(), Err(Error::Validation(_))));

        let no_category = ExpenseDraft::new("Coffee", 4.5);
        assert!(matches!(no_category.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_patch_keeps_identity() {
        let current = expense("e1", Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
        let patched = ExpensePatch::new()
            .with_amount(6.0)
            .with_payment_method(PaymentMethod::DebitCard)
            .apply(&current)
            .unwrap();
        assert_eq!(patched.id, "e1");
        assert_eq!(patched.amount, 6.0);
        assert_eq!(patched.payment_method, PaymentMethod::DebitCard);
        assert_eq!(patched.title, current.title);
        assert_eq!(patched.created_at, current.created_at);

        let blank = ExpensePatch::new().with_title(" ").apply(&current);
        assert!(matches!(blank, Err(Error::Validation(_))));
    }

    #[test]
    fn test_sort_newest_first_undated_last() {
        let t = |d| Some(Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap());
        let mut list = vec![
            expense("undated-a", None),
            expense("old", t(1)),
            expense("new", t(5)),
            expense("undated-b", None),
            expense("mid", t(3)),
        ];
        sort_newest_first(&mut list);
        let ids: Vec<&str> = list.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old", "undated-a", "undated-b"]);
    }
}
