/// Decimal places of the faucet coin.
pub const COIN_DECIMALS: u8 = 6;

/// The pool must hold this many times the stake for a bet to be accepted.
pub const POOL_RESERVE_RATIO: u64 = 10;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AmountError {
    #[error("enter an amount")]
    Empty,
    #[error("amount may only contain digits, found '{0}'")]
    InvalidCharacter(char),
    #[error("amount supports at most {max} decimal places")]
    TooManyDecimals { max: u8 },
    #[error("amount is too large")]
    Overflow,
    #[error("amount must be greater than zero")]
    Zero,
}

/// Filter applied while the user is typing: digits only, empty allowed.
pub fn is_amount_keystroke_valid(input: &str) -> bool {
    input.chars().all(|c| c.is_ascii_digit())
}

fn unit(decimals: u8) -> u64 {
    10u64.saturating_pow(u32::from(decimals))
}

fn checked_unit(decimals: u8) -> Result<u64, AmountError> {
    10u64
        .checked_pow(u32::from(decimals))
        .ok_or(AmountError::Overflow)
}

/// Parses a human amount (`"12"` or `"12.5"`) into base units.
pub fn parse_coin_amount(input: &str, decimals: u8) -> Result<u64, AmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AmountError::Empty);
    }
    let (whole, fraction) = match input.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (input, None),
    };
    if whole.is_empty() {
        return Err(AmountError::Empty);
    }
    for c in whole.chars().chain(fraction.unwrap_or_default().chars()) {
        if !c.is_ascii_digit() {
            return Err(AmountError::InvalidCharacter(c));
        }
    }

    let whole_units = match whole.parse::<u64>().map_err(|_| AmountError::Overflow)? {
        0 => 0,
        n => n
            .checked_mul(checked_unit(decimals)?)
            .ok_or(AmountError::Overflow)?,
    };

    let fraction_units = match fraction {
        None => 0,
        Some("") => return Err(AmountError::Empty),
        Some(digits) => {
            if digits.len() > usize::from(decimals) {
                return Err(AmountError::TooManyDecimals { max: decimals });
            }
            let scale = checked_unit(decimals - digits.len() as u8)?;
            digits
                .parse::<u64>()
                .map_err(|_| AmountError::Overflow)?
                .checked_mul(scale)
                .ok_or(AmountError::Overflow)?
        }
    };

    let total = whole_units
        .checked_add(fraction_units)
        .ok_or(AmountError::Overflow)?;
    if total == 0 {
        return Err(AmountError::Zero);
    }
    Ok(total)
}

/// Exact rendering of base units, trailing fractional zeros trimmed.
pub fn format_coin_amount(base_units: u64, decimals: u8) -> String {
    let one = unit(decimals);
    let whole = base_units / one;
    let fractional = base_units % one;
    if fractional == 0 {
        format!("{}", whole)
    } else {
        let padded = format!("{:0width$}", fractional, width = usize::from(decimals));
        format!("{}.{}", whole, padded.trim_end_matches('0'))
    }
}

/// Whole coins only, fractional part dropped.
pub fn format_whole_coins(base_units: u64, decimals: u8) -> String {
    (base_units / unit(decimals)).to_string()
}

fn coins(base_units: &u64) -> String {
    format_coin_amount(*base_units, COIN_DECIMALS)
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum BetError {
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("bet is below the minimum of {}", coins(.min))]
    BelowMinimum { min: u64 },
    #[error("bet is above the maximum of {}", coins(.max))]
    AboveMaximum { max: u64 },
    #[error("pool holds {} but needs at least {} to cover this bet", coins(.pool), coins(.required))]
    PoolTooSmall { pool: u64, required: u64 },
}

/// Client-side mirror of the contract's bet bounds. Not authoritative.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BetLimits {
    pub min: u64,
    pub max: u64,
    pub pool: u64,
}

impl BetLimits {
    pub fn compute(
        pool_balance: u64,
        wallet_balance: u64,
        min_bet: u64,
        max_bet: Option<u64>,
    ) -> Self {
        let pool_cap = pool_balance / POOL_RESERVE_RATIO;
        let mut max = pool_cap.min(wallet_balance);
        if let Some(cap) = max_bet {
            max = max.min(cap);
        }
        Self {
            min: min_bet,
            max,
            pool: pool_balance,
        }
    }

    pub fn can_play(&self) -> bool {
        self.pool >= self.min.saturating_mul(POOL_RESERVE_RATIO) && self.max >= self.min
    }

    pub fn check(&self, amount: u64) -> Result<(), BetError> {
        if amount < self.min {
            return Err(BetError::BelowMinimum { min: self.min });
        }
        let required = amount.saturating_mul(POOL_RESERVE_RATIO);
        if self.pool < required {
            return Err(BetError::PoolTooSmall {
                pool: self.pool,
                required,
            });
        }
        if amount > self.max {
            return Err(BetError::AboveMaximum { max: self.max });
        }
        Ok(())
    }
}
