use anyhow::{Context, Result};
use glob::glob;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs;
use std::path::Path;

use crate::group::{G, GroupManager};
use crate::tpl::lexer::Delimiters;

/// A template as declared in a group file.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDecl {
    pub name: String,
    pub formal_args: Vec<String>,
    /// Template source, unwrapped from CDATA or unescaped.
    pub body: String,
}

/// One parsed group file.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFile {
    pub name: String,
    pub extends: Option<String>,
    pub delimiters: Delimiters,
    pub templates: Vec<TemplateDecl>,
    /// `(alias, target)` pairs.
    pub aliases: Vec<(String, String)>,
}

/// Loads every XML group file matching `pattern` into the global registry.
///
/// # Arguments
/// * `pattern` - glob pattern, e.g. "resources/templates/**/*.xml"
pub fn load(pattern: &str) -> Result<()> {
    load_into(&G, pattern)
}

pub fn load_into(manager: &GroupManager, pattern: &str) -> Result<()> {
    let paths = glob(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
    let mut files = Vec::new();
    for entry in paths {
        let path = entry.with_context(|| format!("Can't read path matched by: {}", pattern))?;
        if path.is_file() {
            files.push(read_file(&path)?);
        }
    }
    register_all(manager, files)
}

/// Loads group files embedded at compile time (see `template_assets!`).
/// Failures are logged as well as returned, since the caller usually runs
/// before `main`.
pub fn load_assets(assets: Vec<(&str, &str)>) -> Result<()> {
    let result = assets
        .into_iter()
        .map(|(source, content)| parse_group(content, source))
        .collect::<Result<Vec<_>>>()
        .and_then(|files| register_all(&G, files));
    if let Err(e) = &result {
        log::error!("Failed to register embedded template groups: {:#}", e);
    }
    result
}

// --- internals ---

fn read_file(path: &Path) -> Result<GroupFile> {
    let xml = fs::read_to_string(path)
        .with_context(|| format!("Failed to read group file: {}", path.display()))?;
    parse_group(&xml, &path.display().to_string())
}

/// Registers every group first, then links parents, so a file may extend a
/// group defined in a file loaded later in the same call.
fn register_all(manager: &GroupManager, files: Vec<GroupFile>) -> Result<()> {
    for file in &files {
        let group = manager.group_or_create(&file.name, file.delimiters);
        for decl in &file.templates {
            group
                .define(&decl.name, decl.formal_args.iter().cloned(), &decl.body)
                .with_context(|| format!("In group '{}', template '{}'", file.name, decl.name))?;
        }
        for (alias, target) in &file.aliases {
            group.alias(alias.as_str(), target.as_str());
        }
        log::debug!(
            "Registered group '{}' ({} templates, {} aliases)",
            file.name,
            file.templates.len(),
            file.aliases.len()
        );
    }

    for file in &files {
        let Some(parent_name) = &file.extends else {
            continue;
        };
        let parent = manager.group(parent_name).ok_or_else(|| {
            anyhow::anyhow!("Group '{}' extends unknown group '{}'", file.name, parent_name)
        })?;
        if let Some(group) = manager.group(&file.name) {
            group.set_parent(parent)?;
        }
    }
    Ok(())
}

pub fn parse_group(xml: &str, source: &str) -> Result<GroupFile> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut group: Option<GroupFile> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                let name_str = String::from_utf8_lossy(name.as_ref()).into_owned();
                match name_str.as_str() {
                    "group" => group = Some(group_header(e, source)?),
                    "template" => {
                        let file = group.as_mut().ok_or_else(|| {
                            anyhow::anyhow!("<template> outside <group> (Source: {})", source)
                        })?;
                        let (tpl_name, formal_args) = template_header(e, source)?;

                        // Body runs from the end of the start tag to the start of `</template>`.
                        let start_pos = reader.buffer_position() as usize;
                        let end_pos = read_until_end_tag(&mut reader, &name_str, &mut Vec::new())?;
                        let tag_len = name.as_ref().len();
                        if end_pos < tag_len + 3 {
                            anyhow::bail!("Unexpected end tag position (Source: {})", source);
                        }
                        let content_end = end_pos - (tag_len + 3);
                        let raw = if content_end > start_pos {
                            &xml[start_pos..content_end]
                        } else {
                            ""
                        };
                        let body = template_body(raw)
                            .with_context(|| format!("Template '{}' in {}", tpl_name, source))?;
                        file.templates.push(TemplateDecl {
                            name: tpl_name,
                            formal_args,
                            body,
                        });
                    }
                    "alias" => {
                        let file = group.as_mut().ok_or_else(|| {
                            anyhow::anyhow!("<alias> outside <group> (Source: {})", source)
                        })?;
                        file.aliases.push(alias(e, source)?);
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.name();
                let file = match name.as_ref() {
                    b"template" | b"alias" => group.as_mut().ok_or_else(|| {
                        anyhow::anyhow!("Element outside <group> (Source: {})", source)
                    })?,
                    _ => {
                        buf.clear();
                        continue;
                    }
                };
                if name.as_ref() == b"alias" {
                    file.aliases.push(alias(e, source)?);
                } else {
                    let (tpl_name, formal_args) = template_header(e, source)?;
                    file.templates.push(TemplateDecl {
                        name: tpl_name,
                        formal_args,
                        body: String::new(),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => anyhow::bail!("XML parse error: {} (Source: {})", e, source),
            _ => {}
        }
        buf.clear();
    }

    group.ok_or_else(|| anyhow::anyhow!("Group file has no <group> element: {}", source))
}

fn group_header(e: &BytesStart, source: &str) -> Result<GroupFile> {
    let name = get_attribute(e, "name")
        .ok_or_else(|| anyhow::anyhow!("<group> is missing the name attribute: {}", source))?;
    let delimiters = match get_attribute(e, "delimiters") {
        Some(d) => Delimiters::from_name(&d)
            .ok_or_else(|| anyhow::anyhow!("Unknown delimiters '{}' in {}", d, source))?,
        None => Delimiters::default(),
    };
    Ok(GroupFile {
        name,
        extends: get_attribute(e, "extends").filter(|s| !s.trim().is_empty()),
        delimiters,
        templates: Vec::new(),
        aliases: Vec::new(),
    })
}

fn template_header(e: &BytesStart, source: &str) -> Result<(String, Vec<String>)> {
    let name = get_attribute(e, "name")
        .ok_or_else(|| anyhow::anyhow!("<template> is missing the name attribute: {}", source))?;
    let formal_args = get_attribute(e, "args")
        .map(|args| parse_args(&args))
        .unwrap_or_default();
    Ok((name, formal_args))
}

fn alias(e: &BytesStart, source: &str) -> Result<(String, String)> {
    let name = get_attribute(e, "name")
        .ok_or_else(|| anyhow::anyhow!("<alias> is missing the name attribute: {}", source))?;
    let target = get_attribute(e, "target")
        .ok_or_else(|| anyhow::anyhow!("<alias> is missing the target attribute: {}", source))?;
    Ok((name, target))
}

/// `"a, b"` -> `["a", "b"]`
fn parse_args(args: &str) -> Vec<String> {
    args.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unwraps CDATA (or unescapes entities), then drops one leading newline
/// and a trailing whitespace-only line.
fn template_body(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let body = match trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
    {
        Some(inner) => inner.to_string(),
        None => quick_xml::escape::unescape(raw)
            .context("Invalid entity in template body")?
            .into_owned(),
    };

    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(&body);
    let body = match body.rfind('\n') {
        Some(idx) if body[idx + 1..].trim().is_empty() => {
            body[..idx].strip_suffix('\r').unwrap_or(&body[..idx])
        }
        _ => body,
    };
    Ok(body.to_string())
}

/// Reads until the matching end tag; returns the position just after it.
fn read_until_end_tag(
    reader: &mut Reader<&[u8]>,
    target_tag: &str,
    buf: &mut Vec<u8>,
) -> Result<usize> {
    let mut depth = 0;
    loop {
        match reader.read_event_into(buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == target_tag.as_bytes() {
                    depth += 1;
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == target_tag.as_bytes() {
                    if depth == 0 {
                        return Ok(reader.buffer_position() as usize);
                    }
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => anyhow::bail!("Missing end tag: </{}>", target_tag),
            Err(e) => anyhow::bail!("XML parse error: {}", e),
            _ => {}
        }
        buf.clear();
    }
}

fn get_attribute(e: &BytesStart, key: &str) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key.as_bytes())
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}
