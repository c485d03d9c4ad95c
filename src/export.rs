use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::error;

use crate::model::{Key, Language, Module};
use crate::xliff;

/// The four supported interchange formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
    Xliff,
}

impl ExportFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "resources.csv",
            ExportFormat::Json => "resources.json",
            ExportFormat::Xlsx => "resources.xlsx",
            ExportFormat::Xliff => "resources-xlf.zip",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Xliff => "application/zip",
        }
    }
}

/// Everything a renderer needs. Reference translations (culture -> key
/// name -> value) only matter to the XLIFF renderer.
pub struct ExportInput<'a> {
    pub languages: &'a [Language],
    pub modules: &'a [Module],
    pub keys: &'a [Key],
    pub default_code: &'a str,
    pub reference_translations: Option<&'a HashMap<String, HashMap<String, String>>>,
}

/// Flattened key projection used by the JSON renderer and the importer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedKey {
    pub id: String,
    #[serde(default)]
    pub module_id: String,
    #[serde(default)]
    pub value: String,
    pub key_name: String,
    pub module: String,
    #[serde(default)]
    pub tenant: String,
    #[serde(default)]
    pub is_partially_translated: bool,
    #[serde(default)]
    pub routes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub resources: Vec<ExportedResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedResource {
    pub culture: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_length: Option<u32>,
}

/// Render the bundle in the requested format. Renderers are pure: on any
/// failure they log and yield `None`, and the caller may simply re-invoke.
pub fn render(format: ExportFormat, input: &ExportInput) -> Option<Vec<u8>> {
    let result = match format {
        ExportFormat::Csv => render_csv(input),
        ExportFormat::Json => render_json(input),
        ExportFormat::Xlsx => render_xlsx(input),
        ExportFormat::Xliff => xliff::render(input),
    };

    match result {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(?format, "Export rendering failed: {e:#}");
            None
        }
    }
}

/// Leading identity columns of the tabular layouts. The first three are
/// machine identifiers; translators work with the trailing two.
pub(crate) const IDENTITY_COLUMNS: [&str; 5] = ["ItemId", "ModuleId", "Value", "Module", "KeyName"];

/// Culture codes in the bundle, sorted; the default code is included.
pub(crate) fn sorted_codes(languages: &[Language]) -> Vec<&str> {
    let mut codes: Vec<&str> = languages.iter().map(|l| l.code.as_str()).collect();
    codes.sort_unstable();
    codes
}

pub(crate) fn module_name<'a>(modules: &'a [Module], module_id: &str) -> &'a str {
    modules
        .iter()
        .find(|m| m.id == module_id)
        .map(|m| m.name.as_str())
        .unwrap_or("")
}

/// The exportable value for one culture of one key: reserved metadata slots
/// and empty values never leave the engine.
pub(crate) fn exportable_value<'a>(key: &'a Key, code: &str) -> Option<&'a crate::model::Resource> {
    key.resources
        .iter()
        .find(|r| r.culture == code && r.is_translatable() && !r.value.is_empty())
}

fn render_csv(input: &ExportInput) -> anyhow::Result<Vec<u8>> {
    let codes = sorted_codes(input.languages);
    let length_codes: Vec<&str> = codes
        .iter()
        .copied()
        .filter(|c| *c != input.default_code)
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<String> = IDENTITY_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(codes.iter().map(|c| c.to_string()));
    header.extend(length_codes.iter().map(|c| format!("{}_CharacterLength", c)));
    writer.write_record(&header)?;

    for key in input.keys {
        let mut record = vec![
            key.id.clone(),
            key.module_id.clone(),
            key.value.clone(),
            module_name(input.modules, &key.module_id).to_string(),
            key.key_name.clone(),
        ];
        for code in &codes {
            let value = exportable_value(key, code)
                .map(|r| r.value.clone())
                .unwrap_or_default();
            record.push(value);
        }
        for code in &length_codes {
            let length = exportable_value(key, code)
                .and_then(|r| r.character_length)
                .map(|l| l.to_string())
                .unwrap_or_default();
            record.push(length);
        }
        writer.write_record(&record)?;
    }

    Ok(writer.into_inner()?)
}

fn render_json(input: &ExportInput) -> anyhow::Result<Vec<u8>> {
    let projections: Vec<ExportedKey> = input
        .keys
        .iter()
        .map(|key| ExportedKey {
            id: key.id.clone(),
            module_id: key.module_id.clone(),
            value: key.value.clone(),
            key_name: key.key_name.clone(),
            module: module_name(input.modules, &key.module_id).to_string(),
            tenant: key.tenant.clone(),
            is_partially_translated: key.is_partially_translated,
            routes: key.routes.clone(),
            context: key.context.clone(),
            resources: key
                .resources
                .iter()
                .filter(|r| r.is_translatable() && !r.value.is_empty())
                .map(|r| ExportedResource {
                    culture: r.culture.clone(),
                    value: r.value.clone(),
                    character_length: r.character_length,
                })
                .collect(),
        })
        .collect();

    Ok(serde_json::to_vec_pretty(&projections)?)
}

fn render_xlsx(input: &ExportInput) -> anyhow::Result<Vec<u8>> {
    use rust_xlsxwriter::Workbook;

    let codes = sorted_codes(input.languages);
    let length_codes: Vec<&str> = codes
        .iter()
        .copied()
        .filter(|c| *c != input.default_code)
        .collect();

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Resources")?;

    let mut col: u16 = 0;
    for title in IDENTITY_COLUMNS {
        worksheet.write_string(0, col, title)?;
        col += 1;
    }
    for code in &codes {
        worksheet.write_string(0, col, *code)?;
        col += 1;
    }
    for code in &length_codes {
        worksheet.write_string(0, col, format!("{}_CharacterLength", code))?;
        col += 1;
    }

    for (i, key) in input.keys.iter().enumerate() {
        let row = (i + 1) as u32;
        worksheet.write_string(row, 0, &key.id)?;
        worksheet.write_string(row, 1, &key.module_id)?;
        worksheet.write_string(row, 2, &key.value)?;
        worksheet.write_string(row, 3, module_name(input.modules, &key.module_id))?;
        worksheet.write_string(row, 4, &key.key_name)?;

        let mut col: u16 = 5;
        for code in &codes {
            if let Some(resource) = exportable_value(key, code) {
                worksheet.write_string(row, col, &resource.value)?;
            }
            col += 1;
        }
        for code in &length_codes {
            if let Some(length) = exportable_value(key, code).and_then(|r| r.character_length) {
                worksheet.write_number(row, col, length as f64)?;
            }
            col += 1;
        }
    }

    // Machine-identifier columns stay hidden for translators; the header
    // row stays visible while scrolling.
    for col in 0..3 {
        worksheet.set_column_hidden(col)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    Ok(workbook.save_to_buffer()?)
}
