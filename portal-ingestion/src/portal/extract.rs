//! Pure extraction of identifiers and data from portal pages.
//!
//! Everything here works on an owned page body and returns owned values, so
//! the non-`Send` DOM never outlives a single call.

use std::str::FromStr;

use meter_client::domain::MeterReading;
use once_cell::sync::Lazy;
use reqwest::Url;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};

use super::{timestamp, FormatError, PortalError};

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static VIEW_STATE: Lazy<Selector> = Lazy::new(|| selector("input#__VIEWSTATE"));
static VIEW_STATE_GENERATOR: Lazy<Selector> = Lazy::new(|| selector("input#__VIEWSTATEGENERATOR"));
static EVENT_VALIDATION: Lazy<Selector> = Lazy::new(|| selector("input#__EVENTVALIDATION"));
static MAIN_FRAME: Lazy<Selector> = Lazy::new(|| selector("iframe#frmMain"));
static METER_OPTIONS: Lazy<Selector> = Lazy::new(|| selector("select#ddlMeterNo option"));
static DATA_TABLE: Lazy<Selector> = Lazy::new(|| selector("div#divTable table"));
static ROW: Lazy<Selector> = Lazy::new(|| selector("tr"));
static CELL: Lazy<Selector> = Lazy::new(|| selector("td"));

/// Hidden ASP.NET form state that must be echoed back with the login POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTokens {
    pub view_state: String,
    pub view_state_generator: String,
    pub event_validation: String,
}

/// Identifiers carried in the landing page's frame URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameIdentity {
    pub account_id: String,
    pub account_code: String,
    pub portal_no: Option<String>,
}

fn input_value(doc: &Html, sel: &Selector, name: &str) -> Result<String, PortalError> {
    doc.select(sel)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string)
        .ok_or_else(|| PortalError::Protocol(format!("login form is missing {name}")))
}

pub fn login_tokens(body: &str) -> Result<LoginTokens, PortalError> {
    let doc = Html::parse_document(body);
    Ok(LoginTokens {
        view_state: input_value(&doc, &VIEW_STATE, "__VIEWSTATE")?,
        view_state_generator: input_value(&doc, &VIEW_STATE_GENERATOR, "__VIEWSTATEGENERATOR")?,
        event_validation: input_value(&doc, &EVENT_VALIDATION, "__EVENTVALIDATION")?,
    })
}

/// Resolve the landing page's frame URL against `page_url` and read its query.
pub fn frame_identity(body: &str, page_url: &Url) -> Result<FrameIdentity, PortalError> {
    let src = {
        let doc = Html::parse_document(body);
        doc.select(&MAIN_FRAME)
            .next()
            .and_then(|frame| frame.value().attr("src"))
            .map(str::to_string)
            .ok_or_else(|| PortalError::Protocol("landing page has no main frame".to_string()))?
    };

    let frame_url = page_url
        .join(&src)
        .map_err(|e| PortalError::Protocol(format!("invalid frame url {src:?}: {e}")))?;

    let param = |name: &str| {
        frame_url
            .query_pairs()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    };

    let missing = |name: &str| PortalError::Protocol(format!("frame url has no {name}"));
    Ok(FrameIdentity {
        account_id: param("Custid").ok_or_else(|| missing("Custid"))?,
        account_code: param("CustCode").ok_or_else(|| missing("CustCode"))?,
        portal_no: param("PeaNo"),
    })
}

/// Value of the meter selector's chosen option.
///
/// Falls back to the first option when none is marked `selected`, which is
/// what a browser would submit.
pub fn selected_meter_point(body: &str) -> Result<String, PortalError> {
    let doc = Html::parse_document(body);
    let options: Vec<ElementRef<'_>> = doc.select(&METER_OPTIONS).collect();

    options
        .iter()
        .find(|o| o.value().attr("selected").is_some())
        .or_else(|| options.first())
        .and_then(|o| o.value().attr("value"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PortalError::Protocol("meter selector has no chosen option".to_string()))
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Invariant-culture decimal: `.` separator, `,` grouping, blank means zero.
fn parse_rate(raw: &str) -> Result<Decimal, FormatError> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(&cleaned).map_err(|e| FormatError::new(raw, e))
}

/// Parse the daily profile table into chronological readings.
///
/// The first (header) and last (summary) rows are skipped, as is any row with
/// fewer than five cells. The scraped total column is ignored. A page without
/// the table yields no readings: the day is unavailable, not broken.
pub fn reading_table(body: &str) -> Result<Vec<MeterReading>, FormatError> {
    let doc = Html::parse_document(body);
    let Some(table) = doc.select(&DATA_TABLE).next() else {
        return Ok(Vec::new());
    };

    let rows: Vec<ElementRef<'_>> = table.select(&ROW).collect();
    if rows.len() < 2 {
        return Ok(Vec::new());
    }

    let mut readings = Vec::with_capacity(rows.len() - 2);
    for row in &rows[1..rows.len() - 1] {
        let cells: Vec<String> = row.select(&CELL).map(|c| cell_text(&c)).collect();
        if cells.len() < 5 {
            continue;
        }

        readings.push(MeterReading::new(
            timestamp::interval_start(&cells[0])?,
            parse_rate(&cells[1])?,
            parse_rate(&cells[2])?,
            parse_rate(&cells[3])?,
        ));
    }

    Ok(readings)
}
