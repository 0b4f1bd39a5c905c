//! Answer file serialization: INI / JSON / YAML / XML round-trip.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::Value as JsonValue;

use super::AnswerValue;

type Group = BTreeMap<String, AnswerValue>;
type Groups = Vec<(String, Group)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AnswerFormat {
    Ini,
    Json,
    Yaml,
    Xml,
}

impl AnswerFormat {
    pub(crate) fn name(self) -> &'static str {
        match self {
            AnswerFormat::Ini => "ini",
            AnswerFormat::Json => "json",
            AnswerFormat::Yaml => "yaml",
            AnswerFormat::Xml => "xml",
        }
    }

    pub(crate) fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => AnswerFormat::Json,
            Some("xml") => AnswerFormat::Xml,
            Some("yaml") | Some("yml") => AnswerFormat::Yaml,
            _ => AnswerFormat::Ini,
        }
    }

    pub(crate) fn parse(self, raw: &str) -> anyhow::Result<Groups> {
        match self {
            AnswerFormat::Ini => parse_ini(raw),
            AnswerFormat::Json => parse_json(raw),
            AnswerFormat::Yaml => parse_yaml(raw),
            AnswerFormat::Xml => parse_xml(raw),
        }
    }

    pub(crate) fn serialize(self, groups: &Groups) -> anyhow::Result<String> {
        match self {
            AnswerFormat::Ini => Ok(serialize_ini(groups)),
            AnswerFormat::Json => serialize_json(groups),
            AnswerFormat::Yaml => serialize_yaml(groups),
            AnswerFormat::Xml => serialize_xml(groups),
        }
    }
}

fn as_flat_map(groups: &Groups) -> BTreeMap<String, BTreeMap<String, JsonValue>> {
    groups
        .iter()
        .map(|(g, kvs)| {
            let inner = kvs
                .iter()
                .map(|(k, v)| (k.clone(), answer_to_json(v)))
                .collect();
            (g.clone(), inner)
        })
        .collect()
}

fn answer_to_json(v: &AnswerValue) -> JsonValue {
    match v {
        AnswerValue::String(s) => JsonValue::String(s.clone()),
        AnswerValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        AnswerValue::Bool(b) => JsonValue::Bool(*b),
        AnswerValue::Null => JsonValue::Null,
    }
}

fn from_value_map(parsed: BTreeMap<String, BTreeMap<String, JsonValue>>) -> Groups {
    parsed
        .into_iter()
        .map(|(g, kvs)| {
            let inner = kvs.into_iter().map(|(k, v)| (k, AnswerValue::from(v))).collect();
            (g, inner)
        })
        .collect()
}

fn parse_json(raw: &str) -> anyhow::Result<Groups> {
    let parsed: BTreeMap<String, BTreeMap<String, JsonValue>> =
        serde_json::from_str(raw).context("invalid JSON answer file")?;
    Ok(from_value_map(parsed))
}

fn serialize_json(groups: &Groups) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&as_flat_map(groups))?)
}

fn parse_yaml(raw: &str) -> anyhow::Result<Groups> {
    let parsed: BTreeMap<String, BTreeMap<String, JsonValue>> =
        serde_yaml::from_str(raw).context("invalid YAML answer file")?;
    Ok(from_value_map(parsed))
}

fn serialize_yaml(groups: &Groups) -> anyhow::Result<String> {
    Ok(serde_yaml::to_string(&as_flat_map(groups))?)
}

fn parse_ini(raw: &str) -> anyhow::Result<Groups> {
    let ini = ini::Ini::load_from_str(raw).context("invalid INI answer file")?;
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();

    for (section, props) in ini.iter() {
        let section_name = section.unwrap_or(super::GENERAL_NAMESPACE).to_owned();
        let entry = groups.entry(section_name).or_default();
        for (k, v) in props.iter() {
            entry.insert(k.to_owned(), parse_scalar(v));
        }
    }

    Ok(groups.into_iter().collect())
}

fn serialize_ini(groups: &Groups) -> String {
    let mut ini = ini::Ini::new();
    for (group, kvs) in groups {
        for (k, v) in kvs {
            ini.with_section(Some(group.as_str())).set(k.as_str(), v.to_string());
        }
    }

    let mut buf = Vec::new();
    ini.write_to(&mut buf).expect("in-memory write cannot fail");
    String::from_utf8(buf).expect("ini output is valid utf8")
}

fn parse_scalar(raw: &str) -> AnswerValue {
    if raw.is_empty() {
        return AnswerValue::Null;
    }
    if let Ok(b) = raw.parse::<bool>() {
        return AnswerValue::Bool(b);
    }
    if let Ok(n) = raw.parse::<f64>() {
        return AnswerValue::Number(n);
    }
    AnswerValue::String(raw.to_owned())
}

fn serialize_xml(groups: &Groups) -> anyhow::Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Start(BytesStart::new("answers")))?;
    for (group, kvs) in groups {
        let mut group_tag = BytesStart::new("group");
        group_tag.push_attribute(("name", group.as_str()));
        writer.write_event(Event::Start(group_tag))?;

        for (key, value) in kvs {
            let mut param_tag = BytesStart::new("param");
            param_tag.push_attribute(("name", key.as_str()));
            writer.write_event(Event::Start(param_tag))?;
            if !matches!(value, AnswerValue::Null) {
                writer.write_event(Event::Text(BytesText::new(&value.to_string())))?;
            }
            writer.write_event(Event::End(BytesEnd::new("param")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("group")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("answers")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

fn parse_xml(raw: &str) -> anyhow::Result<Groups> {
    let mut reader = Reader::from_str(raw);
    reader.trim_text(true);

    let mut groups: BTreeMap<String, Group> = BTreeMap::new();
    let mut current_group: Option<String> = None;
    let mut current_param: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"group" => {
                let name = attr(&e, "name")?.ok_or_else(|| anyhow!("<group> missing name"))?;
                groups.entry(name.clone()).or_default();
                current_group = Some(name);
            }
            Event::End(e) if e.name().as_ref() == b"group" => {
                current_group = None;
            }
            Event::Start(e) if e.name().as_ref() == b"param" => {
                let name = attr(&e, "name")?.ok_or_else(|| anyhow!("<param> missing name"))?;
                current_param = Some(name);
            }
            Event::Text(text) => {
                if let (Some(group), Some(param)) = (&current_group, &current_param) {
                    let value = text.unescape()?.into_owned();
                    groups
                        .entry(group.clone())
                        .or_default()
                        .insert(param.clone(), parse_scalar(&value));
                }
            }
            Event::End(e) if e.name().as_ref() == b"param" => {
                if let (Some(group), Some(param)) = (&current_group, current_param.take()) {
                    groups.entry(group.clone()).or_default().entry(param).or_insert(AnswerValue::Null);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(groups.into_iter().collect())
}

fn attr(tag: &BytesStart, name: &str) -> anyhow::Result<Option<String>> {
    for attribute in tag.attributes() {
        let attribute = attribute?;
        if attribute.key.as_ref() == name.as_bytes() {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Groups {
        let mut general = Group::new();
        general.insert("provider".to_owned(), AnswerValue::String("docker".to_owned()));
        general.insert("namespace".to_owned(), AnswerValue::String("cli-ns".to_owned()));

        let mut helloweb = Group::new();
        helloweb.insert("port".to_owned(), AnswerValue::Number(8080.0));
        helloweb.insert("enabled".to_owned(), AnswerValue::Bool(true));

        vec![
            (super::super::GENERAL_NAMESPACE.to_owned(), general),
            ("helloweb".to_owned(), helloweb),
        ]
    }

    #[test]
    fn json_round_trips() {
        let groups = sample();
        let text = AnswerFormat::Json.serialize(&groups).unwrap();
        let parsed = AnswerFormat::Json.parse(&text).unwrap();
        assert_eq!(as_flat_map(&parsed), as_flat_map(&groups));
    }

    #[test]
    fn yaml_round_trips() {
        let groups = sample();
        let text = AnswerFormat::Yaml.serialize(&groups).unwrap();
        let parsed = AnswerFormat::Yaml.parse(&text).unwrap();
        assert_eq!(as_flat_map(&parsed), as_flat_map(&groups));
    }

    #[test]
    fn ini_round_trips() {
        let groups = sample();
        let text = AnswerFormat::Ini.serialize(&groups).unwrap();
        let parsed = AnswerFormat::Ini.parse(&text).unwrap();
        assert_eq!(as_flat_map(&parsed), as_flat_map(&groups));
    }

    #[test]
    fn xml_round_trips() {
        let groups = sample();
        let text = AnswerFormat::Xml.serialize(&groups).unwrap();
        let parsed = AnswerFormat::Xml.parse(&text).unwrap();
        assert_eq!(as_flat_map(&parsed), as_flat_map(&groups));
    }

    #[test]
    fn detect_picks_format_from_extension() {
        assert_eq!(AnswerFormat::detect(Path::new("a.json")), AnswerFormat::Json);
        assert_eq!(AnswerFormat::detect(Path::new("a.yaml")), AnswerFormat::Yaml);
        assert_eq!(AnswerFormat::detect(Path::new("a.xml")), AnswerFormat::Xml);
        assert_eq!(AnswerFormat::detect(Path::new("a.conf")), AnswerFormat::Ini);
    }
}
