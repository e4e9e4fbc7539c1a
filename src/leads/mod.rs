pub mod board;
pub mod cache;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::LeadError;

pub use board::{LeadBoard, LeadWatch};
pub use cache::LeadCache;

pub const LEADS_TABLE: &str = "leads";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static NON_DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9]").unwrap());

const MONTHS_ID: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "Mei", "Jun", "Jul", "Agu", "Sep", "Okt", "Nov", "Des",
];

/// Western Indonesia Time, where the sales team works.
const WIB_OFFSET_SECS: i32 = 7 * 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub company: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub phone: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub needs: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub details: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default = "default_status", deserialize_with = "null_as_new")]
    pub status: String,
}

fn default_status() -> String {
    "new".to_string()
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_new<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_status))
}

/// Accepts RFC 3339, Postgres `timestamptz` text (`2025-05-01 10:00:00+00`)
/// and offset-less `timestamp` values, which are taken as UTC. Anything else
/// is treated as absent.
fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.and_then(|raw| parse_timestamp(&raw)))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    log::debug!("Unrecognised lead timestamp {:?}", raw);
    None
}

/// Decodes a listing row by row. Rows that cannot be read as a lead (no
/// numeric id, wrong field types) are skipped with a warning.
pub fn decode_leads(rows: Vec<serde_json::Value>) -> Vec<Lead> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<Lead>(row) {
            Ok(lead) => Some(lead),
            Err(e) => {
                log::warn!("Skipping unreadable lead row: {}", e);
                None
            }
        })
        .collect()
}

impl Lead {
    /// Short Indonesian date in WIB, e.g. `5 Mar 2025, 14.30`.
    pub fn display_date(&self) -> String {
        let Some(created_at) = self.created_at else {
            return "-".to_string();
        };
        let Some(wib) = FixedOffset::east_opt(WIB_OFFSET_SECS) else {
            return "-".to_string();
        };
        let local = created_at.with_timezone(&wib);
        format!(
            "{} {} {}, {:02}.{:02}",
            local.day(),
            MONTHS_ID[local.month0() as usize],
            local.year(),
            local.hour(),
            local.minute()
        )
    }

    pub fn whatsapp_url(&self) -> String {
        format!("https://wa.me/{}", NON_DIGIT_RE.replace_all(&self.phone, ""))
    }

    pub fn need_label(&self) -> &str {
        NeedCategory::parse(&self.needs)
            .map(NeedCategory::label)
            .unwrap_or(self.needs.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeedCategory {
    Printer,
    Hardware,
    Cctv,
    Network,
    Maintenance,
}

impl NeedCategory {
    pub const ALL: [NeedCategory; 5] = [
        NeedCategory::Printer,
        NeedCategory::Hardware,
        NeedCategory::Cctv,
        NeedCategory::Network,
        NeedCategory::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NeedCategory::Printer => "printer",
            NeedCategory::Hardware => "hardware",
            NeedCategory::Cctv => "cctv",
            NeedCategory::Network => "network",
            NeedCategory::Maintenance => "maintenance",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NeedCategory::Printer => "Solusi Printer & Refill",
            NeedCategory::Hardware => "Hardware & Komputer",
            NeedCategory::Cctv => "Instalasi CCTV",
            NeedCategory::Network => "Infrastruktur Jaringan",
            NeedCategory::Maintenance => "Maintenance & Support",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw.trim())
    }
}

/// Quote request from the contact form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadForm {
    pub name: String,
    pub company: String,
    pub email: String,
    pub phone: String,
    pub needs: String,
    #[serde(default)]
    pub details: String,
}

impl LeadForm {
    pub fn validate(&self) -> Result<NeedCategory, LeadError> {
        let required = [
            ("name", &self.name),
            ("company", &self.company),
            ("email", &self.email),
            ("phone", &self.phone),
            ("needs", &self.needs),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(LeadError::Invalid(field));
            }
        }
        if !EMAIL_RE.is_match(self.email.trim()) {
            return Err(LeadError::Invalid("email"));
        }
        NeedCategory::parse(&self.needs).ok_or(LeadError::Invalid("needs"))
    }

    /// Row for the `leads` table; id and timestamp are assigned by the backend.
    pub fn to_row(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name.trim(),
            "company": self.company.trim(),
            "email": self.email.trim(),
            "phone": self.phone.trim(),
            "needs": self.needs.trim(),
            "details": self.details.trim(),
            "status": default_status(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn form() -> LeadForm {
        LeadForm {
            name: "Budi Santoso".to_string(),
            company: "CV Sejahtera".to_string(),
            email: "budi@sejahtera.co.id".to_string(),
            phone: "+62 812-3456-7890".to_string(),
            needs: "cctv".to_string(),
            details: "4 kamera untuk gudang".to_string(),
        }
    }

    #[test]
    fn valid_form_passes() {
        assert_eq!(form().validate().unwrap(), NeedCategory::Cctv);
        let row = form().to_row();
        assert_eq!(row["status"], "new");
        assert!(row.get("id").is_none());
    }

    #[test]
    fn missing_and_malformed_fields_are_named() {
        let mut missing_phone = form();
        missing_phone.phone = "  ".to_string();
        assert!(matches!(missing_phone.validate(), Err(LeadError::Invalid("phone"))));

        let mut bad_email = form();
        bad_email.email = "budi at sejahtera".to_string();
        assert!(matches!(bad_email.validate(), Err(LeadError::Invalid("email"))));

        let mut unknown_need = form();
        unknown_need.needs = "catering".to_string();
        assert!(matches!(unknown_need.validate(), Err(LeadError::Invalid("needs"))));
    }

    #[test]
    fn details_are_optional() {
        let mut no_details = form();
        no_details.details.clear();
        assert!(no_details.validate().is_ok());
    }

    #[test]
    fn display_helpers() {
        let lead = Lead {
            id: 1,
            name: "Budi".to_string(),
            company: String::new(),
            email: "b@x.id".to_string(),
            phone: "+62 812-3456-7890".to_string(),
            needs: "network".to_string(),
            details: String::new(),
            created_at: Some(Utc.with_ymd_and_hms(2025, 8, 17, 3, 5, 0).unwrap()),
            status: "new".to_string(),
        };
        assert_eq!(lead.display_date(), "17 Agu 2025, 10.05");
        assert_eq!(lead.whatsapp_url(), "https://wa.me/6281234567890");
        assert_eq!(lead.need_label(), "Infrastruktur Jaringan");

        let undated = Lead { created_at: None, ..lead };
        assert_eq!(undated.display_date(), "-");
    }

    #[test]
    fn decodes_backend_row() {
        let row = serde_json::json!({
            "id": 12,
            "name": "Sari",
            "company": "PT Abadi",
            "email": "sari@abadi.id",
            "phone": "0812",
            "needs": "printer",
            "details": null,
            "created_at": "2025-02-01T09:30:00.123456+00:00",
            "status": "new"
        });
        let lead: Lead = serde_json::from_value(row).unwrap();
        assert_eq!(lead.details, "");

        let row = serde_json::json!({
            "id": 12, "name": "Sari", "email": "sari@abadi.id", "phone": "0812",
            "needs": "printer", "created_at": "2025-02-01T09:30:00.123456+00:00"
        });
        let lead: Lead = serde_json::from_value(row).unwrap();
        assert_eq!(lead.status, "new");
        assert!(lead.created_at.is_some());
    }

    #[test]
    fn null_strings_decode_as_empty() {
        let row = serde_json::json!({
            "id": 3, "name": "Dewi", "company": null, "email": "dewi@toko.id",
            "phone": null, "needs": "printer", "details": null,
            "created_at": "2025-05-01T10:00:00+00:00", "status": null
        });
        let lead: Lead = serde_json::from_value(row).unwrap();
        assert_eq!(lead.phone, "");
        assert_eq!(lead.status, "new");
        assert_eq!(lead.whatsapp_url(), "https://wa.me/");
    }

    #[test]
    fn offset_less_timestamps_are_utc() {
        let row = serde_json::json!({
            "id": 4, "name": "Agus", "email": "agus@x.id", "phone": "0813",
            "needs": "network", "created_at": "2025-05-01T10:00:00.123456"
        });
        let lead: Lead = serde_json::from_value(row).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(lead.created_at.map(|t| t.timestamp()), Some(expected.timestamp()));
        assert_eq!(lead.display_date(), "1 Mei 2025, 17.00");
    }

    #[test]
    fn postgres_text_timestamps_are_read() {
        assert_eq!(
            parse_timestamp("2025-05-01 10:00:00+07"),
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 3, 0, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp("2025-05-01 10:00:00"),
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("kemarin"), None);
    }

    #[test]
    fn unreadable_rows_are_skipped() {
        let rows = vec![
            serde_json::json!({"id": 1, "name": "Rina", "email": "r@x.id", "phone": "0812", "needs": "cctv"}),
            serde_json::json!({"id": "dua", "name": "Tono"}),
            serde_json::json!({"id": 3, "name": "Wati", "phone": null, "needs": "printer"}),
        ];
        let ids: Vec<i64> = decode_leads(rows).iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
