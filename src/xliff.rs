//! XLIFF 1.2 rendering: a zip archive carrying one `<code>.xlf` document
//! per non-default language, with one `<file>` element per module.

use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::HashMap;
use std::io::{Cursor, Write as _};
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::export::{module_name, sorted_codes, ExportInput};
use crate::model::{timestamp, Key};

const XLIFF_NS: &str = "urn:oasis:names:tc:xliff:document:1.2";

pub fn render(input: &ExportInput) -> Result<Vec<u8>> {
    let target_languages: Vec<&str> = sorted_codes(input.languages)
        .into_iter()
        .filter(|c| *c != input.default_code)
        .collect();

    if target_languages.is_empty() {
        anyhow::bail!("No target languages for XLIFF export");
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for target in &target_languages {
        let reference = input
            .reference_translations
            .and_then(|all| all.get(*target));
        let document = render_language(input, target, reference)?;

        zip.start_file(format!("{}.xlf", target), options)
            .context("Failed to start zip entry")?;
        zip.write_all(&document)
            .context("Failed to write zip entry")?;
    }

    let cursor = zip.finish().context("Failed to finish zip archive")?;
    Ok(cursor.into_inner())
}

fn render_language(
    input: &ExportInput,
    target: &str,
    reference: Option<&HashMap<String, String>>,
) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut xliff = BytesStart::new("xliff");
    xliff.push_attribute(("version", "1.2"));
    xliff.push_attribute(("xmlns", XLIFF_NS));
    writer.write_event(Event::Start(xliff))?;

    // Keys grouped per module, in module list order
    for module in input.modules {
        let module_keys: Vec<&Key> = input
            .keys
            .iter()
            .filter(|k| k.module_id == module.id)
            .collect();
        if module_keys.is_empty() {
            continue;
        }
        write_file_element(&mut writer, input, target, &module.name, &module_keys, reference)?;
    }

    // Keys whose module is unknown still export, under one unnamed file
    let orphan_keys: Vec<&Key> = input
        .keys
        .iter()
        .filter(|k| module_name(input.modules, &k.module_id).is_empty())
        .collect();
    if !orphan_keys.is_empty() {
        write_file_element(&mut writer, input, target, "Unknown", &orphan_keys, reference)?;
    }

    writer.write_event(Event::End(BytesEnd::new("xliff")))?;
    Ok(writer.into_inner().into_inner())
}

fn write_file_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    input: &ExportInput,
    target: &str,
    module_name: &str,
    keys: &[&Key],
    reference: Option<&HashMap<String, String>>,
) -> Result<()> {
    let mut file = BytesStart::new("file");
    file.push_attribute(("source-language", input.default_code));
    file.push_attribute(("target-language", target));
    file.push_attribute(("datatype", "plaintext"));
    file.push_attribute(("original", module_name));
    writer.write_event(Event::Start(file))?;

    writer.write_event(Event::Start(BytesStart::new("header")))?;
    write_note(writer, &format!("Module: {}", module_name))?;
    write_note(writer, &format!("Target Language: {}", target))?;
    write_note(writer, &format!("Export Date: {}", timestamp()))?;
    writer.write_event(Event::End(BytesEnd::new("header")))?;

    writer.write_event(Event::Start(BytesStart::new("body")))?;

    for key in keys {
        let source = match key.resource(input.default_code) {
            Some(r) if !r.value.is_empty() => r,
            // No source text, nothing a translator could work from
            _ => continue,
        };
        let target_resource = key.resource(target).filter(|r| !r.value.is_empty());

        let mut unit = BytesStart::new("trans-unit");
        unit.push_attribute(("id", format!("{}_{}", key.id, target).as_str()));
        unit.push_attribute(("resname", key.key_name.as_str()));
        writer.write_event(Event::Start(unit))?;

        write_text_element(writer, "source", &source.value, None)?;

        // Target value preference: stored value, then reference
        // translation, then an empty needs-translation stub.
        match target_resource {
            Some(resource) => {
                let state = if key.is_partially_translated {
                    "needs-translation"
                } else {
                    "translated"
                };
                write_text_element(writer, "target", &resource.value, Some(state))?;
            }
            None => match reference.and_then(|r| r.get(&key.key_name)).filter(|v| !v.is_empty()) {
                Some(value) => write_text_element(writer, "target", value, Some("translated"))?,
                None => write_text_element(writer, "target", "", Some("needs-translation"))?,
            },
        }

        write_note(writer, &format!("Module: {}", module_name))?;
        if !key.routes.is_empty() {
            write_note(writer, &format!("Routes: {}", key.routes.join(", ")))?;
        }
        if let Some(length) = target_resource.and_then(|r| r.character_length) {
            write_note(writer, &format!("CharacterLength: {}", length))?;
        }
        if let Some(context) = key.context.as_deref().filter(|c| !c.is_empty()) {
            write_note(writer, &format!("Context: {}", context))?;
        }

        writer.write_event(Event::End(BytesEnd::new("trans-unit")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("body")))?;
    writer.write_event(Event::End(BytesEnd::new("file")))?;
    Ok(())
}

fn write_note(writer: &mut Writer<Cursor<Vec<u8>>>, text: &str) -> Result<()> {
    write_text_element(writer, "note", text, None)
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
    state: Option<&str>,
) -> Result<()> {
    let mut element = BytesStart::new(name);
    if let Some(state) = state {
        element.push_attribute(("state", state));
    }
    writer.write_event(Event::Start(element))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
