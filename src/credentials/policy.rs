//! Sign-up password policy. Evaluation is a pure function of the password.

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PolicyRule {
    MinLength,
    HasUpper,
    HasLower,
    HasDigit,
    HasSpecial,
}

impl PolicyRule {
    pub const ALL: [Self; 5] = [
        Self::MinLength,
        Self::HasUpper,
        Self::HasLower,
        Self::HasDigit,
        Self::HasSpecial,
    ];

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::MinLength => "at least 8 characters",
            Self::HasUpper => "one uppercase letter",
            Self::HasLower => "one lowercase letter",
            Self::HasDigit => "one number",
            Self::HasSpecial => "one special character (!@#$%^&*)",
        }
    }

    #[must_use]
    pub fn is_satisfied_by(self, password: &str) -> bool {
        match self {
            Self::MinLength => password.chars().count() >= MIN_PASSWORD_LENGTH,
            Self::HasUpper => password.chars().any(|c| c.is_ascii_uppercase()),
            Self::HasLower => password.chars().any(|c| c.is_ascii_lowercase()),
            Self::HasDigit => password.chars().any(|c| c.is_ascii_digit()),
            Self::HasSpecial => password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)),
        }
    }
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PolicyResult {
    pub min_length: bool,
    pub has_upper: bool,
    pub has_lower: bool,
    pub has_digit: bool,
    pub has_special: bool,
}

impl PolicyResult {
    #[must_use]
    pub fn evaluate(password: &str) -> Self {
        Self {
            min_length: PolicyRule::MinLength.is_satisfied_by(password),
            has_upper: PolicyRule::HasUpper.is_satisfied_by(password),
            has_lower: PolicyRule::HasLower.is_satisfied_by(password),
            has_digit: PolicyRule::HasDigit.is_satisfied_by(password),
            has_special: PolicyRule::HasSpecial.is_satisfied_by(password),
        }
    }

    #[must_use]
    pub const fn get(&self, rule: PolicyRule) -> bool {
        match rule {
            PolicyRule::MinLength => self.min_length,
            PolicyRule::HasUpper => self.has_upper,
            PolicyRule::HasLower => self.has_lower,
            PolicyRule::HasDigit => self.has_digit,
            PolicyRule::HasSpecial => self.has_special,
        }
    }

    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        self.min_length && self.has_upper && self.has_lower && self.has_digit && self.has_special
    }

    #[must_use]
    pub fn unmet(&self) -> Vec<PolicyRule> {
        PolicyRule::ALL
            .into_iter()
            .filter(|rule| !self.get(*rule))
            .collect()
    }
}

/// An empty confirmation has not been typed yet, so it is not a mismatch.
#[must_use]
pub fn passwords_match(password: &str, confirm: &str) -> bool {
    confirm.is_empty() || password == confirm
}
