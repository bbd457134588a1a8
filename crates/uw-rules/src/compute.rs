//! The pure terms computation.
//!
//! Identical inputs always give identical [`Terms`]: fixed-point arithmetic
//! only, no clock, no randomness, no I/O.

use rust_decimal::{Decimal, RoundingStrategy};
use uw_core::enums::Program;

use crate::error::RulesError;
use crate::input::RulesInput;
use crate::jurisdiction::{Adjustment, AdjustmentKind, Jurisdiction, apply_usury_cap};
use crate::program::ProgramTable;
use crate::terms::{Terms, WaterfallSplit};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;
const MONTHS: Decimal = Decimal::from_parts(12, 0, 0, false, 0);
/// Intermediate precision for the amortization factor.
const FACTOR_DP: u32 = 16;

/// Compute deal terms for `program` in `jurisdiction`.
///
/// The rate is index + spread + LTV adjustment (priced on the requested
/// LTV), held to the usury ceiling. The loan is the requested amount, reduced
/// to the smaller of the LTV and DSCR limits when it exceeds them.
///
/// # Errors
///
/// [`RulesError::UnknownJurisdiction`], [`RulesError::InvalidInput`], or
/// [`RulesError::Overflow`] for inputs beyond fixed-point range.
pub fn compute(input: &RulesInput, program: Program, jurisdiction: &str) -> Result<Terms, RulesError> {
    input.validate()?;
    let table = ProgramTable::for_program(program);
    let place = Jurisdiction::lookup(jurisdiction)?;
    let mut adjustments = Vec::new();

    let requested_ltv = pct_of(input.requested_amount, input.property_value, "requested ltv")?;
    let ltv_adjustment = table.ltv_adjustment(requested_ltv);
    let raw_rate = add(add(table.index_rate, table.spread, "rate")?, ltv_adjustment, "rate")?;
    let capped = apply_usury_cap(raw_rate, place);
    adjustments.extend(capped.adjustment);
    let interest_rate = capped.rate;

    let constant = annual_constant(interest_rate, table.amortization_months)?;

    let max_by_ltv = mul(input.property_value, div(table.max_ltv, HUNDRED, "max ltv")?, "max ltv")?;
    let max_by_dscr = if input.net_operating_income > Decimal::ZERO && constant > Decimal::ZERO {
        div(div(input.net_operating_income, table.min_dscr, "dscr sizing")?, constant, "dscr sizing")?
    } else {
        Decimal::ZERO
    };
    let max_loan_amount = max_by_ltv
        .min(max_by_dscr)
        .round_dp_with_strategy(0, RoundingStrategy::ToZero);

    let loan_amount = if input.requested_amount > max_loan_amount {
        adjustments.push(Adjustment {
            kind: AdjustmentKind::LoanSizing,
            field: "loan_amount".to_string(),
            from: input.requested_amount,
            to: max_loan_amount,
            reason: if max_by_ltv <= max_by_dscr {
                format!("{} maximum LTV is {}%", program, table.max_ltv)
            } else {
                format!("{} minimum DSCR is {}", program, table.min_dscr)
            },
        });
        max_loan_amount
    } else {
        input.requested_amount
    };

    let ltv = round2(pct_of(loan_amount, input.property_value, "ltv")?);
    let origination_fee = round2(mul(loan_amount, div(table.origination_fee_pct, HUNDRED, "fee")?, "fee")?);
    let annual_debt_service = round2(mul(loan_amount, constant, "debt service")?);
    let dscr = if annual_debt_service > Decimal::ZERO {
        Some(round2(div(input.net_operating_income, annual_debt_service, "dscr")?))
    } else {
        None
    };

    let waterfall = table
        .waterfall
        .map(|w| {
            let equity = sub(input.property_value, loan_amount, "equity")?;
            let distributable_cash = sub(input.net_operating_income, annual_debt_service, "distributable")?
                .max(Decimal::ZERO);
            let preferred = round2(mul(equity, div(w.preferred_return, HUNDRED, "preferred")?, "preferred")?);
            let preferred_distribution = preferred.min(distributable_cash);
            let remainder = sub(distributable_cash, preferred_distribution, "remainder")?;
            let investor_extra = round2(mul(remainder, div(w.investor_share, HUNDRED, "split")?, "split")?);
            Ok::<_, RulesError>(WaterfallSplit {
                preferred_return_rate: w.preferred_return,
                equity,
                distributable_cash,
                preferred_distribution,
                investor_distribution: add(preferred_distribution, investor_extra, "split")?,
                sponsor_distribution: sub(remainder, investor_extra, "split")?,
            })
        })
        .transpose()?;

    // Syndications withhold on investor distributions, loans on interest.
    let withholding_base = match &waterfall {
        Some(w) => w.investor_distribution,
        None => mul(loan_amount, div(interest_rate, HUNDRED, "interest")?, "interest")?,
    };
    let withholding_amount = round2(mul(
        withholding_base,
        div(place.withholding_rate, HUNDRED, "withholding")?,
        "withholding",
    )?);

    tracing::debug!(%program, jurisdiction = place.code, %interest_rate, %loan_amount, "terms computed");

    Ok(Terms {
        program,
        jurisdiction: place.code.to_string(),
        index_rate: table.index_rate,
        spread: table.spread,
        ltv_adjustment,
        interest_rate,
        requested_amount: input.requested_amount,
        max_loan_amount,
        loan_amount,
        property_value: input.property_value,
        ltv,
        origination_fee_pct: table.origination_fee_pct,
        origination_fee,
        term_months: table.term_months,
        amortization_months: table.amortization_months,
        annual_debt_service,
        net_operating_income: input.net_operating_income,
        dscr,
        withholding_rate: place.withholding_rate,
        withholding_amount,
        waterfall,
        adjustments,
    })
}

/// Annual debt service per unit of principal at `rate` percent.
///
/// Interest-only loans pay `rate / 100`. Amortizing loans pay
/// `12 * r * f / (f - 1)` with monthly rate `r` and `f = (1 + r)^n`.
///
/// # Errors
///
/// [`RulesError::Overflow`] for rates beyond fixed-point range.
pub fn annual_constant(rate: Decimal, amortization_months: u32) -> Result<Decimal, RulesError> {
    let annual = div(rate, HUNDRED, "annual constant")?;
    if amortization_months == 0 {
        return Ok(annual);
    }
    let n = Decimal::from(amortization_months);
    let monthly = div(annual, MONTHS, "annual constant")?;
    if monthly.is_zero() {
        return div(MONTHS, n, "annual constant");
    }
    let step = add(Decimal::ONE, monthly, "annual constant")?;
    let mut factor = Decimal::ONE;
    for _ in 0..amortization_months {
        factor = mul(factor, step, "annual constant")?.round_dp(FACTOR_DP);
    }
    let payment = div(
        mul(monthly, factor, "annual constant")?,
        sub(factor, Decimal::ONE, "annual constant")?,
        "annual constant",
    )?;
    mul(MONTHS, payment, "annual constant")
}

fn pct_of(part: Decimal, whole: Decimal, what: &'static str) -> Result<Decimal, RulesError> {
    mul(div(part, whole, what)?, HUNDRED, what)
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn add(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, RulesError> {
    a.checked_add(b).ok_or(RulesError::Overflow(what))
}

fn sub(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, RulesError> {
    a.checked_sub(b).ok_or(RulesError::Overflow(what))
}

fn mul(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, RulesError> {
    a.checked_mul(b).ok_or(RulesError::Overflow(what))
}

fn div(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, RulesError> {
    a.checked_div(b).ok_or(RulesError::Overflow(what))
}
