use std::sync::Arc;

use meter_client::domain::{AccountIdentity, MeterReading};
use reqwest::{
    cookie::{CookieStore, Jar},
    Client, Url,
};
use time::{macros::format_description, Date};

use super::{
    extract::{self, FrameIdentity},
    is_login_page,
    profile::{parse_customer_profile, CustomerProfile},
    PortalError,
};
use crate::config::PortalConfig;

const LOGIN_PAGE: &str = "Index.aspx";
const LANDING_PAGE: &str = "MainCust.aspx";
const PROFILE_PAGE: &str = "CustProfile.aspx";
const OVERVIEW_SELECT_PAGE: &str = "frmOverviewSel.aspx";
const DAILY_PROFILE_PAGE: &str = "ShowDailyProfile.aspx";

/// Label of the portal's login button ("log in"), posted verbatim.
const LOGIN_BUTTON_LABEL: &str = "เข้าสู่ระบบ";

const SESSION_COOKIES: [&str; 2] = ["ASP.NET_SessionId", ".ASPXAUTH"];

/// Where a [`PortalSession`] is in the navigation sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Identified(FrameIdentity),
    Ready(AccountIdentity),
    Failed,
}

impl SessionState {
    fn frame_identity(&self) -> Option<(&str, &str)> {
        match self {
            Self::Identified(f) => Some((f.account_id.as_str(), f.account_code.as_str())),
            Self::Ready(i) => Some((i.account_id.as_str(), i.account_code.as_str())),
            _ => None,
        }
    }
}

struct Endpoints {
    base: Url,
    login: Url,
    landing: Url,
    profile: Url,
    overview_select: Url,
    daily_profile: Url,
}

impl Endpoints {
    fn new(base_url: &str) -> Result<Self, PortalError> {
        let base = Url::parse(base_url).map_err(|e| PortalError::Config(format!("base_url {base_url:?}: {e}")))?;
        let join = |page: &str| {
            base.join(page)
                .map_err(|e| PortalError::Config(format!("cannot join {page} onto {base}: {e}")))
        };

        Ok(Self {
            login: join(LOGIN_PAGE)?,
            landing: join(LANDING_PAGE)?,
            profile: join(PROFILE_PAGE)?,
            overview_select: join(OVERVIEW_SELECT_PAGE)?,
            daily_profile: join(DAILY_PROFILE_PAGE)?,
            base,
        })
    }
}

/// One cookie-bound browsing session against the portal.
///
/// Calls must follow `login` → `resolve_identity` → `select_meter` →
/// `fetch_daily_readings`*. The cookie jar belongs to this session alone.
/// A session is meant for one caller at a time.
pub struct PortalSession {
    client: Client,
    jar: Arc<Jar>,
    endpoints: Endpoints,
    state: SessionState,
}

impl PortalSession {
    pub fn new(config: &PortalConfig) -> Result<Self, PortalError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            jar,
            endpoints: Endpoints::new(&config.base_url)?,
            state: SessionState::Unauthenticated,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&AccountIdentity> {
        match &self.state {
            SessionState::Ready(identity) => Some(identity),
            _ => None,
        }
    }

    fn has_session_cookie(&self) -> bool {
        let Some(header) = self.jar.cookies(&self.endpoints.base) else {
            return false;
        };
        let Ok(cookies) = header.to_str() else {
            return false;
        };
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, _)| SESSION_COOKIES.contains(&name))
    }

    /// Log in with the portal's form.
    ///
    /// Returns `Ok(false)` when the portal rejects the credentials; errors are
    /// reserved for transport and layout problems.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<bool, PortalError> {
        self.state = SessionState::Failed;

        metrics::counter!("portal_requests_total", "page" => "login").increment(1);
        let login_page = self
            .client
            .get(self.endpoints.login.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let tokens = extract::login_tokens(&login_page)?;

        let form = [
            ("txtUsername", username),
            ("txtPassword", password),
            ("__VIEWSTATE", tokens.view_state.as_str()),
            ("__VIEWSTATEGENERATOR", tokens.view_state_generator.as_str()),
            ("__EVENTVALIDATION", tokens.event_validation.as_str()),
            ("btnOK", LOGIN_BUTTON_LABEL),
        ];

        metrics::counter!("portal_requests_total", "page" => "login").increment(1);
        let result = self
            .client
            .post(self.endpoints.login.clone())
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        if is_login_page(&result) {
            tracing::info!("portal login rejected, still on the login form");
            metrics::counter!("portal_login_rejected_total").increment(1);
            return Ok(false);
        }

        if !self.has_session_cookie() {
            tracing::warn!("portal left the login form but set no session cookie");
            metrics::counter!("portal_login_rejected_total").increment(1);
            return Ok(false);
        }

        tracing::info!("portal login succeeded");
        self.state = SessionState::Authenticated;
        Ok(true)
    }

    /// GET a post-login page, failing if the portal bounced us to the login form.
    async fn get_page(&self, page: &'static str, url: Url) -> Result<(Url, String), PortalError> {
        metrics::counter!("portal_requests_total", "page" => page).increment(1);
        let response = self.client.get(url).send().await?.error_for_status()?;
        let final_url = response.url().clone();
        let body = response.text().await?;

        if is_login_page(&body) {
            tracing::warn!(page, "portal session expired");
            metrics::counter!("portal_session_expired_total").increment(1);
            return Err(PortalError::SessionExpired);
        }

        Ok((final_url, body))
    }

    /// Read the account identifiers from the landing page's main frame.
    pub async fn resolve_identity(&mut self) -> Result<FrameIdentity, PortalError> {
        if matches!(self.state, SessionState::Unauthenticated | SessionState::Failed) {
            return Err(PortalError::OutOfSequence {
                operation: "resolve_identity",
                required: "logged-in",
            });
        }

        let (page_url, body) = self.get_page(LANDING_PAGE, self.endpoints.landing.clone()).await?;
        let frame = extract::frame_identity(&body, &page_url)?;

        tracing::info!(account_code = %frame.account_code, "resolved portal account");
        self.state = SessionState::Identified(frame.clone());
        Ok(frame)
    }

    fn account_query(&self, operation: &'static str) -> Result<[(&'static str, String); 2], PortalError> {
        let (account_id, account_code) = self.state.frame_identity().ok_or(PortalError::OutOfSequence {
            operation,
            required: "identified",
        })?;
        Ok([
            ("CustCode", account_code.to_string()),
            ("Custid", account_id.to_string()),
        ])
    }

    /// Customer, meter, business and contact details from the profile page.
    pub async fn customer_profile(&self) -> Result<CustomerProfile, PortalError> {
        let query = self.account_query("customer_profile")?;
        let mut url = self.endpoints.profile.clone();
        url.query_pairs_mut().extend_pairs(query.iter());

        let (_, body) = self.get_page(PROFILE_PAGE, url).await?;
        let mut profile = parse_customer_profile(&body);

        profile.personal.account_code = Some(query[0].1.clone());
        profile.personal.account_id = Some(query[1].1.clone());
        if let Some(identity) = self.identity() {
            profile.meter.meter_point_id = Some(identity.meter_point_id.clone());
        }
        Ok(profile)
    }

    /// Pick up the meter point from the overview selection page.
    pub async fn select_meter(&mut self) -> Result<AccountIdentity, PortalError> {
        let query = self.account_query("select_meter")?;
        let mut url = self.endpoints.overview_select.clone();
        url.query_pairs_mut().extend_pairs(query.iter());

        let (_, body) = self.get_page(OVERVIEW_SELECT_PAGE, url).await?;
        let meter_point_id = extract::selected_meter_point(&body)?;

        let [(_, account_code), (_, account_id)] = query;
        let identity = AccountIdentity {
            account_id,
            account_code,
            meter_point_id,
        };

        tracing::info!(meter_point = %identity.meter_point_id, "selected meter");
        self.state = SessionState::Ready(identity.clone());
        Ok(identity)
    }

    fn daily_profile_url(&self, identity: &AccountIdentity, date: Date) -> Result<Url, PortalError> {
        let rep_date = date
            .format(format_description!("[day]/[month]/[year]"))
            .map_err(|e| PortalError::Protocol(format!("cannot format {date}: {e}")))?;

        let mut url = self.endpoints.daily_profile.clone();
        url.query_pairs_mut()
            .append_pair("Overview", "1")
            .append_pair("Custid", &identity.account_id)
            .append_pair("CustCode", &identity.account_code)
            .append_pair("MeterPoint", &identity.meter_point_id)
            .append_pair("SumMeter", "0")
            .append_pair("RepDate", &rep_date)
            .append_pair("GrphType", "Line")
            .append_pair("DataType", "2")
            .extend_pairs(
                [
                    ("kWh", "1"),
                    ("kVarh", "0"),
                    ("kW", "0"),
                    ("kVar", "0"),
                    ("Cur", "0"),
                    ("Vol", "0"),
                    ("PF", "0"),
                    ("PD", "0"),
                    ("kWh1", "0"),
                    ("kVarh1", "0"),
                    ("kW1", "0"),
                    ("kVar1", "0"),
                ]
                .iter(),
            );
        Ok(url)
    }

    /// The day's 15-minute readings; empty when the portal has none for that day.
    pub async fn fetch_daily_readings(&self, date: Date) -> Result<Vec<MeterReading>, PortalError> {
        let identity = self.identity().ok_or(PortalError::OutOfSequence {
            operation: "fetch_daily_readings",
            required: "ready",
        })?;

        let url = self.daily_profile_url(identity, date)?;
        let (_, body) = self.get_page(DAILY_PROFILE_PAGE, url).await?;
        let readings = extract::reading_table(&body)?;

        tracing::debug!(%date, count = readings.len(), "fetched daily readings");
        Ok(readings)
    }
}
