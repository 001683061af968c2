#![allow(dead_code)]

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use meter_client::{
    db::{ReadingRepository, ReadingStore},
    domain::FixedClock,
};
use portal_ingestion::config::PortalConfig;
use time::{macros::format_description, Date};

pub const USERNAME: &str = "020012345678";
pub const PASSWORD: &str = "secret";
pub const ACCOUNT_ID: &str = "4711";
pub const ACCOUNT_CODE: &str = "020012345678";
pub const METER_POINT: &str = "MP-222";

const SESSION_COOKIE: &str = "ASP.NET_SessionId=fake-session-1";

const LOGIN_PAGE: &str = r#"<html><body>
<form method="post" action="Index.aspx" id="form1">
  <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="dDwtMTA4MzE0MjEwNTs7Pg==" />
  <input type="hidden" name="__VIEWSTATEGENERATOR" id="__VIEWSTATEGENERATOR" value="C2EE9ABB" />
  <input type="hidden" name="__EVENTVALIDATION" id="__EVENTVALIDATION" value="/wEdAAT8" />
  <input name="txtUsername" type="text" id="txtUsername" />
  <input name="txtPassword" type="password" id="txtPassword" />
  <input type="submit" name="btnOK" id="btnOK" />
</form>
</body></html>"#;

const WELCOME_PAGE: &str = r#"<html><body><p>Welcome</p></body></html>"#;

const PROFILE_PAGE: &str = r#"<html><body>
  <span id="lblSitename">North Plant</span>
  <span id="lblCustomerName">ACME Co.</span>
  <span id="lblCustomerMeterNo">M-0042</span>
  <span id="lblCustomerKVA">250</span>
  <span id="lblCustomerBussType">TOU</span>
  <span id="lblCustomerEmail">ops@acme.test</span>
</body></html>"#;

const OVERVIEW_PAGE: &str = r#"<html><body>
  <select name="ddlMeterNo" id="ddlMeterNo">
    <option value="MP-111">Meter 1</option>
    <option selected="selected" value="MP-222">Meter 2</option>
  </select>
</body></html>"#;

const NO_DATA_PAGE: &str = r#"<html><body><p>No data</p></body></html>"#;

/// In-process stand-in for the metering portal.
#[derive(Default)]
pub struct PortalState {
    available: Mutex<BTreeSet<Date>>,
    expired: AtomicBool,
    daily_requests: Mutex<Vec<Date>>,
    login_form: Mutex<Option<HashMap<String, String>>>,
}

impl PortalState {
    /// Every later page answers with the login form.
    pub fn expire_session(&self) {
        self.expired.store(true, Ordering::SeqCst);
    }

    pub fn daily_requests(&self) -> Vec<Date> {
        self.daily_requests.lock().unwrap().clone()
    }

    pub fn posted_login_form(&self) -> Option<HashMap<String, String>> {
        self.login_form.lock().unwrap().clone()
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let has_cookie = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains(SESSION_COOKIE));
        has_cookie && !self.expired.load(Ordering::SeqCst)
    }
}

pub struct FakePortal {
    pub base_url: String,
    pub state: Arc<PortalState>,
}

impl FakePortal {
    pub async fn start(available: &[Date]) -> Self {
        let state = Arc::new(PortalState::default());
        state.available.lock().unwrap().extend(available.iter().copied());

        let app = Router::new()
            .route("/AMRWEB/Index.aspx", get(login_page).post(login))
            .route("/AMRWEB/MainCust.aspx", get(landing))
            .route("/AMRWEB/CustProfile.aspx", get(profile))
            .route("/AMRWEB/frmOverviewSel.aspx", get(overview))
            .route("/AMRWEB/ShowDailyProfile.aspx", get(daily_profile))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/AMRWEB/"),
            state,
        }
    }

    pub fn config(&self) -> PortalConfig {
        PortalConfig {
            base_url: self.base_url.clone(),
            timeout_secs: 5,
            utc_offset_hours: 7,
        }
    }
}

pub fn repository(dir: &tempfile::TempDir, today: Date) -> ReadingRepository {
    ReadingRepository::new(ReadingStore::new(dir.path()), Arc::new(FixedClock(today)))
}

async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

async fn login(State(state): State<Arc<PortalState>>, Form(form): Form<HashMap<String, String>>) -> Response {
    let accepted = form.get("txtUsername").map(String::as_str) == Some(USERNAME)
        && form.get("txtPassword").map(String::as_str) == Some(PASSWORD);
    *state.login_form.lock().unwrap() = Some(form);

    if accepted {
        (
            [(header::SET_COOKIE, format!("{SESSION_COOKIE}; path=/; HttpOnly"))],
            Html(WELCOME_PAGE),
        )
            .into_response()
    } else {
        Html(LOGIN_PAGE).into_response()
    }
}

async fn landing(State(state): State<Arc<PortalState>>, headers: HeaderMap) -> Html<String> {
    if !state.authorized(&headers) {
        return Html(LOGIN_PAGE.to_string());
    }
    Html(format!(
        r#"<html><body><iframe id="frmMain" src="CustMain.aspx?Custid={ACCOUNT_ID}&amp;CustCode={ACCOUNT_CODE}&amp;PeaNo=99"></iframe></body></html>"#
    ))
}

fn account_matches(query: &HashMap<String, String>) -> bool {
    query.get("Custid").map(String::as_str) == Some(ACCOUNT_ID)
        && query.get("CustCode").map(String::as_str) == Some(ACCOUNT_CODE)
}

async fn profile(
    State(state): State<Arc<PortalState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    match (state.authorized(&headers), account_matches(&query)) {
        (false, _) => Html(LOGIN_PAGE),
        (true, false) => Html(NO_DATA_PAGE),
        (true, true) => Html(PROFILE_PAGE),
    }
}

async fn overview(
    State(state): State<Arc<PortalState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    match (state.authorized(&headers), account_matches(&query)) {
        (false, _) => Html(LOGIN_PAGE),
        (true, false) => Html(NO_DATA_PAGE),
        (true, true) => Html(OVERVIEW_PAGE),
    }
}

async fn daily_profile(
    State(state): State<Arc<PortalState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Html<String> {
    if !state.authorized(&headers) {
        return Html(LOGIN_PAGE.to_string());
    }
    if !account_matches(&query) || query.get("MeterPoint").map(String::as_str) != Some(METER_POINT) {
        return Html(NO_DATA_PAGE.to_string());
    }

    let Some(date) = query
        .get("RepDate")
        .and_then(|raw| Date::parse(raw, format_description!("[day]/[month]/[year]")).ok())
    else {
        return Html(NO_DATA_PAGE.to_string());
    };
    state.daily_requests.lock().unwrap().push(date);

    if state.available.lock().unwrap().contains(&date) {
        Html(daily_table(date))
    } else {
        Html(NO_DATA_PAGE.to_string())
    }
}

/// 96 rows stamped with the end of each quarter hour, `24.00` for the last.
fn daily_table(date: Date) -> String {
    let mut rows = String::from("<tr><th>Date/Time</th><th>A</th><th>B</th><th>C</th><th>Total</th></tr>\n");
    for slot in 1..=96u32 {
        let minutes = slot * 15;
        rows.push_str(&format!(
            "<tr><td>{:02}/{:02}/{} {:02}.{:02}</td><td>0.2500</td><td>0.1000</td><td></td><td>999</td></tr>\n",
            date.day(),
            u8::from(date.month()),
            date.year(),
            minutes / 60,
            minutes % 60,
        ));
    }
    rows.push_str("<tr><td>Total</td><td>24.00</td><td>9.60</td><td>0</td><td>33.60</td></tr>\n");

    format!(r#"<html><body><div id="divTable"><table>{rows}</table></div></body></html>"#)
}
