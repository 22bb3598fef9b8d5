//! Contact export to TXT, CSV and JSON

use serde::Serialize;

use crate::errors::ImportError;
use crate::import::ImportFormat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportContact {
    pub email: String,
    pub name: Option<String>,
}

impl From<sendwise_entities::contacts::Model> for ExportContact {
    fn from(contact: sendwise_entities::contacts::Model) -> Self {
        Self {
            email: contact.email,
            name: contact.name,
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn export_contacts(
    format: ImportFormat,
    contacts: &[ExportContact],
) -> Result<Vec<u8>, ImportError> {
    match format {
        ImportFormat::Txt => {
            let mut out = String::new();
            for contact in contacts {
                out.push_str(&contact.email);
                out.push('\n');
            }
            Ok(out.into_bytes())
        }
        ImportFormat::Csv => {
            let mut out = String::from("email,name\n");
            for contact in contacts {
                out.push_str(&csv_field(&contact.email));
                out.push(',');
                out.push_str(&csv_field(contact.name.as_deref().unwrap_or("")));
                out.push('\n');
            }
            Ok(out.into_bytes())
        }
        ImportFormat::Json => serde_json::to_vec_pretty(contacts)
            .map_err(|e| ImportError::Malformed(format!("Failed to encode JSON: {}", e))),
        ImportFormat::Xlsx => Err(ImportError::UnsupportedFormat(
            "XLSX export is not supported".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::parse_contacts;

    fn sample() -> Vec<ExportContact> {
        vec![
            ExportContact {
                email: "jane@example.com".to_string(),
                name: Some("Doe, Jane \"JD\"".to_string()),
            },
            ExportContact {
                email: "bob@example.com".to_string(),
                name: None,
            },
        ]
    }

    #[test]
    fn test_csv_export_quotes_fields() {
        let bytes = export_contacts(ImportFormat::Csv, &sample()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "email,name\njane@example.com,\"Doe, Jane \"\"JD\"\"\"\nbob@example.com,\n"
        );
    }

    #[test]
    fn test_csv_export_reimports() {
        let bytes = export_contacts(ImportFormat::Csv, &sample()).unwrap();
        let report = parse_contacts(ImportFormat::Csv, &bytes).unwrap();
        assert_eq!(report.contacts[0].name.as_deref(), Some("Doe, Jane \"JD\""));
        assert_eq!(report.contacts[1].email, "bob@example.com");
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_txt_and_json_export() {
        let txt = export_contacts(ImportFormat::Txt, &sample()).unwrap();
        assert_eq!(txt, b"jane@example.com\nbob@example.com\n");

        let json = export_contacts(ImportFormat::Json, &sample()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value[1]["email"], "bob@example.com");
        assert!(value[1]["name"].is_null());
    }

    #[test]
    fn test_xlsx_export_is_unsupported() {
        assert!(matches!(
            export_contacts(ImportFormat::Xlsx, &sample()),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }
}
