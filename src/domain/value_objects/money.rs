use rust_decimal::Decimal;

/// A USDC amount with 6 fractional digits of precision.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct UsdcAmount(Decimal);

impl UsdcAmount {
    pub const ZERO: UsdcAmount = UsdcAmount(Decimal::ZERO);

    /// Wrap a decimal, normalized to USDC's 6 fractional digits.
    pub fn new(value: Decimal) -> Self {
        Self(value.round_dp(6))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Net payout after deducting the platform fee.
    ///
    /// `fee_rate` is a fraction in [0, 1]; the result is rounded down to the
    /// nearest micro-USDC so the platform never overpays by rounding.
    pub fn net_of_fee(&self, fee_rate: Decimal) -> UsdcAmount {
        let net = self.0 * (Decimal::ONE - fee_rate);
        UsdcAmount(net.round_dp_with_strategy(
            6,
            rust_decimal::RoundingStrategy::ToZero,
        ))
    }

}

impl std::fmt::Display for UsdcAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
