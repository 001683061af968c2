use scraper::{Html, Selector};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersonalInformation {
    pub customer_name: Option<String>,
    pub account_code: Option<String>,
    pub account_id: Option<String>,
    pub site: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MeterInformation {
    pub meter_number: Option<String>,
    pub meter_point_id: Option<String>,
    pub ct_vt_ratio: Option<String>,
    pub kva: Option<String>,
    pub billing_cycle: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusinessInformation {
    pub rate_type: Option<String>,
    pub billing_method: Option<String>,
    pub business_type: Option<String>,
    pub business_size: Option<String>,
    pub industrial_estate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContactInformation {
    pub address: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
}

/// Everything the account profile page tells about a customer.
///
/// Fields the page does not show are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomerProfile {
    pub personal: PersonalInformation,
    pub meter: MeterInformation,
    pub business: BusinessInformation,
    pub contact: ContactInformation,
}

fn label(doc: &Html, id: &str) -> Option<String> {
    let sel = Selector::parse(&format!("span#{id}")).ok()?;
    doc.select(&sel)
        .next()
        .map(|span| span.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Read the label spans of the account profile page.
pub fn parse_customer_profile(body: &str) -> CustomerProfile {
    let doc = Html::parse_document(body);
    let l = |id: &str| label(&doc, id);

    CustomerProfile {
        personal: PersonalInformation {
            customer_name: l("lblCustomerName"),
            site: l("lblSitename"),
            ..Default::default()
        },
        meter: MeterInformation {
            meter_number: l("lblCustomerMeterNo"),
            ct_vt_ratio: l("lblCustomerCTVT"),
            kva: l("lblCustomerKVA"),
            billing_cycle: l("lblCustomerReset"),
            ..Default::default()
        },
        business: BusinessInformation {
            rate_type: l("lblCustomerBussType"),
            billing_method: l("lblCustomerAcctT"),
            business_type: l("lblCustomerTypeBuss"),
            business_size: l("lblCustomerRateType"),
            industrial_estate: l("lblCustomerIndust"),
        },
        contact: ContactInformation {
            address: l("lblCustomerAdd"),
            phone: l("lblCustomerPhone"),
            fax: l("lblCustomerFax"),
            contact_person: l("lblCustomerContact"),
            email: l("lblCustomerEmail"),
            website: l("lblCustomerWeb"),
        },
    }
}
