//! Per-program pricing and sizing tables.
//!
//! All rates and percentages are in percent (`6.50` is 6.5%).

use rust_decimal::Decimal;
use uw_core::enums::Program;

const fn pct(hundredths: u32) -> Decimal {
    Decimal::from_parts(hundredths, 0, 0, false, 2)
}

/// Rate add-on applied when the requested LTV is strictly above `above`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LtvTier {
    pub above: Decimal,
    pub add: Decimal,
}

/// Equity distribution terms for syndications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaterfallTable {
    /// Annual preferred return on investor equity.
    pub preferred_return: Decimal,
    /// Investor share of cash remaining after the preferred return.
    pub investor_share: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramTable {
    pub program: Program,
    pub index_rate: Decimal,
    pub spread: Decimal,
    pub ltv_tiers: &'static [LtvTier],
    pub origination_fee_pct: Decimal,
    pub max_ltv: Decimal,
    pub min_dscr: Decimal,
    /// Zero means interest-only.
    pub amortization_months: u32,
    pub term_months: u32,
    pub waterfall: Option<WaterfallTable>,
}

const INDEX_RATE: Decimal = pct(425);

const LTV_TIERS: &[LtvTier] = &[
    LtvTier {
        above: pct(6000),
        add: pct(25),
    },
    LtvTier {
        above: pct(7000),
        add: pct(75),
    },
    LtvTier {
        above: pct(8000),
        add: pct(150),
    },
];

const CONVENTIONAL: ProgramTable = ProgramTable {
    program: Program::Conventional,
    index_rate: INDEX_RATE,
    spread: pct(225),
    ltv_tiers: LTV_TIERS,
    origination_fee_pct: pct(100),
    max_ltv: pct(7500),
    min_dscr: pct(125),
    amortization_months: 360,
    term_months: 120,
    waterfall: None,
};

const BRIDGE: ProgramTable = ProgramTable {
    program: Program::Bridge,
    index_rate: INDEX_RATE,
    spread: pct(450),
    ltv_tiers: LTV_TIERS,
    origination_fee_pct: pct(200),
    max_ltv: pct(7000),
    min_dscr: pct(110),
    amortization_months: 0,
    term_months: 24,
    waterfall: None,
};

const SBA_7A: ProgramTable = ProgramTable {
    program: Program::Sba7a,
    index_rate: INDEX_RATE,
    spread: pct(275),
    ltv_tiers: LTV_TIERS,
    origination_fee_pct: pct(225),
    max_ltv: pct(8500),
    min_dscr: pct(115),
    amortization_months: 300,
    term_months: 300,
    waterfall: None,
};

const SYNDICATION: ProgramTable = ProgramTable {
    program: Program::Syndication,
    index_rate: INDEX_RATE,
    spread: pct(300),
    ltv_tiers: LTV_TIERS,
    origination_fee_pct: pct(150),
    max_ltv: pct(6500),
    min_dscr: pct(130),
    amortization_months: 360,
    term_months: 84,
    waterfall: Some(WaterfallTable {
        preferred_return: pct(800),
        investor_share: pct(7000),
    }),
};

impl ProgramTable {
    #[must_use]
    pub const fn for_program(program: Program) -> &'static Self {
        match program {
            Program::Conventional => &CONVENTIONAL,
            Program::Bridge => &BRIDGE,
            Program::Sba7a => &SBA_7A,
            Program::Syndication => &SYNDICATION,
        }
    }

    /// Rate add-on for a requested LTV: the highest tier it exceeds.
    #[must_use]
    pub fn ltv_adjustment(&self, ltv: Decimal) -> Decimal {
        self.ltv_tiers
            .iter()
            .filter(|t| ltv > t.above)
            .map(|t| t.add)
            .max()
            .unwrap_or(Decimal::ZERO)
    }
}
