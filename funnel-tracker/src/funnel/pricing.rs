//! Plans shown on the pricing screens, and mail address validation

use crate::answers::PlanWeeks;
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Basic shape check: something@something.something without whitespace
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plan {
    pub weeks: PlanWeeks,
    pub original_price: f64,
    pub price: f64,
    pub weekly_price: f64,
    pub sale_percent: u32,
    pub popular: bool,
}

pub static STANDARD_PLANS: [Plan; 3] = [
    Plan {
        weeks: PlanWeeks::Four,
        original_price: 16.99,
        price: 13.49,
        weekly_price: 3.35,
        sale_percent: 20,
        popular: false,
    },
    Plan {
        weeks: PlanWeeks::Twelve,
        original_price: 36.99,
        price: 24.99,
        weekly_price: 1.99,
        sale_percent: 32,
        popular: true,
    },
    Plan {
        weeks: PlanWeeks::TwentyFour,
        original_price: 79.99,
        price: 41.99,
        weekly_price: 1.69,
        sale_percent: 48,
        popular: false,
    },
];

/// Personal offer shown after the standard plans are dismissed
pub static OFFER_PLAN: Plan = Plan {
    weeks: PlanWeeks::Twelve,
    original_price: 36.99,
    price: 18.99,
    weekly_price: 1.59,
    sale_percent: 50,
    popular: false,
};

impl Plan {
    pub fn standard(weeks: PlanWeeks) -> &'static Plan {
        match weeks {
            PlanWeeks::Four => &STANDARD_PLANS[0],
            PlanWeeks::Twelve => &STANDARD_PLANS[1],
            PlanWeeks::TwentyFour => &STANDARD_PLANS[2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("@c.de"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email(" a@b.co"));
    }

    #[test]
    fn test_standard_lookup() {
        for plan in STANDARD_PLANS.iter() {
            assert_eq!(Plan::standard(plan.weeks), plan);
            assert!(plan.price < plan.original_price);
        }
        assert_eq!(Plan::standard(PlanWeeks::Twelve).price, 24.99);
        assert!(Plan::standard(PlanWeeks::Twelve).popular);
    }
}
