//! Placeholder templates for chat messages
//!
//! Supported placeholders: `{form_title}`, `{date}`, `{time}`,
//! `{datetime}`, `{page_url}`, `{field:<name>}` and `{field_label:<name>}`.
//! Field placeholders for schema fields that were not submitted render as
//! an empty value (or the configured label); anything unrecognized is left
//! untouched.

use chrono::{DateTime, Local};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till1, take_while1},
    character::complete::char,
    combinator::{consumed, map, value},
    multi::many0,
    sequence::{delimited, preceded},
};
use serde_json::{Map, Value};

use super::telegram::{DATETIME_FORMAT, format_value};
use super::{PAGE_URL_KEY, escape, field_label};
use crate::schema::FormSchema;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Placeholder<'a> {
    FormTitle,
    Date,
    Time,
    Datetime,
    PageUrl,
    Field(&'a str),
    FieldLabel(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(Placeholder<'a>, &'a str),
}

fn field_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c| c != '}' && c != '{')(input)
}

fn placeholder(input: &str) -> IResult<&str, Placeholder<'_>> {
    delimited(
        char('{'),
        alt((
            map(preceded(tag("field_label:"), field_name), Placeholder::FieldLabel),
            map(preceded(tag("field:"), field_name), Placeholder::Field),
            value(Placeholder::FormTitle, tag("form_title")),
            value(Placeholder::Datetime, tag("datetime")),
            value(Placeholder::Date, tag("date")),
            value(Placeholder::Time, tag("time")),
            value(Placeholder::PageUrl, tag("page_url")),
        )),
        char('}'),
    )(input)
}

fn segment(input: &str) -> IResult<&str, Segment<'_>> {
    alt((
        map(consumed(placeholder), |(raw, p)| Segment::Placeholder(p, raw)),
        map(take_till1(|c| c == '{'), Segment::Text),
        map(tag("{"), Segment::Text),
    ))(input)
}

fn parse(template: &str) -> Vec<Segment<'_>> {
    match many0(segment)(template) {
        Ok((_, segments)) => segments,
        Err(_) => vec![Segment::Text(template)],
    }
}

/// Substitute placeholders in `template` for one submission
#[must_use]
pub fn render(
    template: &str,
    schema: &FormSchema,
    data: &Map<String, Value>,
    now: &DateTime<Local>,
) -> String {
    let mut out = String::with_capacity(template.len());
    for segment in parse(template) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder(p, raw) => match p {
                Placeholder::FormTitle => out.push_str(&escape(&schema.title)),
                Placeholder::Date => out.push_str(&now.format("%d.%m.%Y").to_string()),
                Placeholder::Time => out.push_str(&now.format("%H:%M:%S").to_string()),
                Placeholder::Datetime => out.push_str(&now.format(DATETIME_FORMAT).to_string()),
                Placeholder::PageUrl => {
                    if let Some(url) = data.get(PAGE_URL_KEY).and_then(Value::as_str) {
                        out.push_str(&escape(url));
                    }
                }
                Placeholder::Field(name) => match data.get(name) {
                    Some(v) if name != PAGE_URL_KEY => out.push_str(&format_value(schema, name, v)),
                    _ if schema.field(name).is_some() => {}
                    _ => out.push_str(raw),
                },
                Placeholder::FieldLabel(name) => {
                    if (data.contains_key(name) && name != PAGE_URL_KEY)
                        || schema.field(name).is_some()
                    {
                        out.push_str(&escape(&field_label(schema, name)));
                    } else {
                        out.push_str(raw);
                    }
                }
            },
        }
    }
    out
}
