use std::{env, sync::Arc};

use anyhow::{bail, Context, Result};
use meter_client::{
    db::{aggregation::days_back, ReadingRepository, ReadingStore},
    domain::{AccountKey, PortalClock},
};
use portal_ingestion::{config::AppConfig, observability};
use rust_decimal::Decimal;
use serde::Serialize;
use time::Time;

const DEFAULT_DAYS: u32 = 30;

#[derive(Serialize)]
struct DailyRow {
    date: String,
    rate_a: Decimal,
    rate_b: Decimal,
    rate_c: Decimal,
    total: Decimal,
    tou_cost: Decimal,
    flat_cost: Decimal,
}

fn usage() -> anyhow::Error {
    anyhow::anyhow!("usage: consumption_report <account> [days] [--csv <path>]")
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let mut args = env::args().skip(1);
    let Some(account) = args.next() else {
        return Err(usage());
    };
    let mut days = DEFAULT_DAYS;
    let mut csv_path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--csv" => csv_path = Some(args.next().ok_or_else(usage)?),
            n => days = n.parse().map_err(|_| usage())?,
        }
    }
    if days == 0 {
        bail!("days must be at least 1");
    }

    let cfg = AppConfig::load()?;
    let key = AccountKey::new(&account)?;
    let clock = Arc::new(PortalClock::new(cfg.portal.utc_offset()?));
    let repository = ReadingRepository::new(ReadingStore::new(&cfg.store.data_dir), clock);

    // Window of complete days: [today - days, today).
    let today = repository.today();
    let end = today.with_time(Time::MIDNIGHT);
    let start = days_back(end, days);

    // Independent queries, each on its own partition handle.
    let (week_profile, period_profile, hourly, daily) = tokio::try_join!(
        repository.average_by_time_of_day(&key, 7),
        repository.average_by_time_of_day(&key, days),
        repository.hourly_averages(&key, start, end),
        repository.daily_totals(&key, start, end),
    )?;

    if daily.is_empty() {
        tracing::warn!(account = %key, days, "no readings stored for the window");
        return Ok(());
    }

    if let Some(peak) = hourly.iter().max_by_key(|r| r.total()) {
        tracing::info!(
            hour = peak.period_start.hour(),
            average = %peak.total().round_dp(4),
            "busiest hour of day"
        );
    }
    tracing::info!(
        slots_7d = week_profile.len(),
        slots_window = period_profile.len(),
        "time-of-day profiles"
    );

    let comparison = cfg.tariff.compare(&daily);
    tracing::info!(
        account = %key,
        days = comparison.days.len(),
        tou_total = %comparison.tou_total.round_dp(2),
        flat_total = %comparison.flat_total.round_dp(2),
        difference = %comparison.difference.round_dp(2),
        difference_percent = %comparison.difference_percent.round_dp(2),
        cheaper = ?comparison.cheaper,
        "tariff comparison"
    );

    if let Some(path) = csv_path {
        let mut wtr = csv::Writer::from_path(&path).with_context(|| format!("cannot create {path}"))?;
        for day in &comparison.days {
            wtr.serialize(DailyRow {
                date: day.reading.period_start.date().to_string(),
                rate_a: day.reading.rate_a,
                rate_b: day.reading.rate_b,
                rate_c: day.reading.rate_c,
                total: day.reading.total(),
                tou_cost: day.tou_cost.round_dp(4),
                flat_cost: day.flat_cost.round_dp(4),
            })?;
        }
        wtr.flush()?;
        tracing::info!(%path, rows = comparison.days.len(), "daily totals written");
    }

    Ok(())
}
