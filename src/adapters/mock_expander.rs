//! mockjs-style structural template expansion.
//!
//! Object keys may carry a generation rule after a `|`:
//!
//! - `"name|count"` / `"name|min-max"` - repeat a string or array, pick that
//!   many properties of an object, or draw an integer
//! - `"name|+step"` - increment a number (or walk an array) each time the same
//!   key is emitted within one expansion
//! - `"name|min-max.dmin-dmax"` - a float with that many decimals
//! - `"name|1": [..]` - pick one element
//!
//! Strings may contain `@placeholders` such as `@name`, `@email`,
//! `@integer(1, 10)` or `@date`. A string that is exactly one placeholder
//! yields a typed value.

use fake::faker::address::en::{CityName, CountryName, PostCode};
use fake::faker::internet::en::{IPv4, SafeEmail};
use fake::faker::lorem::en::{Paragraph, Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Map, Number, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct MockExpander;

impl MockExpander {
    pub fn new() -> Self {
        Self
    }

    /// Expand a structural template into concrete data.
    pub fn expand(&self, template: &Value) -> Value {
        Expansion::default().value("", template)
    }

    /// Render `@placeholders` in a single string.
    pub fn render(&self, text: &str) -> Value {
        render_string(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rule {
    min: i64,
    max: i64,
    step: Option<i64>,
    decimals: Option<(u32, u32)>,
    ranged: bool,
}

impl Rule {
    fn count(&self, rng: &mut impl Rng) -> usize {
        rng.gen_range(self.min..=self.max).max(0) as usize
    }
}

fn parse_key(key: &str) -> (&str, Option<Rule>) {
    match key.split_once('|') {
        Some((name, rule_text)) => {
            let rule = parse_rule(rule_text);
            if rule.is_none() {
                tracing::debug!(key, "Ignoring unparseable mock rule");
            }
            (name, rule)
        }
        None => (key, None),
    }
}

fn parse_rule(rule_text: &str) -> Option<Rule> {
    let rule_text = rule_text.trim();

    if let Some(step) = rule_text.strip_prefix('+') {
        let step = if step.is_empty() { 1 } else { step.parse().ok()? };
        return Some(Rule {
            min: 1,
            max: 1,
            step: Some(step),
            decimals: None,
            ranged: false,
        });
    }

    let (integer, decimals) = match rule_text.split_once('.') {
        Some((integer, decimals)) => (integer, Some(decimals)),
        None => (rule_text, None),
    };
    let (min, max, ranged) = parse_range(integer)?;
    let decimals = match decimals {
        Some(raw) => {
            let (low, high, _) = parse_range(raw)?;
            Some((low.max(0) as u32, high.max(0) as u32))
        }
        None => None,
    };

    Some(Rule {
        min,
        max,
        step: None,
        decimals,
        ranged,
    })
}

/// `"5"` or `"1-10"`; a leading `-` belongs to the lower bound.
fn parse_range(raw: &str) -> Option<(i64, i64, bool)> {
    let split = raw.get(1..).and_then(|rest| rest.find('-')).map(|i| i + 1);
    match split {
        Some(split) => {
            let a: i64 = raw[..split].parse().ok()?;
            let b: i64 = raw[split + 1..].parse().ok()?;
            Some((a.min(b), a.max(b), true))
        }
        None => {
            let n: i64 = raw.parse().ok()?;
            Some((n, n, false))
        }
    }
}

/// State for one `expand` call; `+step` counters are keyed by field path.
#[derive(Default)]
struct Expansion {
    counters: HashMap<String, i64>,
    cursors: HashMap<String, usize>,
}

impl Expansion {
    fn value(&mut self, path: &str, value: &Value) -> Value {
        match value {
            Value::String(text) => render_string(text),
            Value::Array(items) => {
                let item_path = format!("{path}[]");
                Value::Array(items.iter().map(|item| self.value(&item_path, item)).collect())
            }
            Value::Object(map) => self.object(path, map),
            other => other.clone(),
        }
    }

    fn object(&mut self, path: &str, map: &Map<String, Value>) -> Value {
        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            let (name, rule) = parse_key(key);
            let child = if path.is_empty() {
                name.to_string()
            } else {
                format!("{path}.{name}")
            };
            let expanded = match rule {
                Some(rule) => self.apply(&child, rule, value),
                None => self.value(&child, value),
            };
            out.insert(name.to_string(), expanded);
        }
        Value::Object(out)
    }

    fn apply(&mut self, path: &str, rule: Rule, value: &Value) -> Value {
        let mut rng = rand::thread_rng();
        match value {
            Value::String(text) => match rule.step {
                Some(_) => render_string(text),
                None => render_string(&text.repeat(rule.count(&mut rng))),
            },
            Value::Number(base) => self.number(path, rule, base),
            Value::Bool(flag) => {
                let chance = if rule.ranged && rule.min + rule.max > 0 {
                    rule.min as f64 / (rule.min + rule.max) as f64
                } else {
                    0.5
                };
                let keep = rng.gen_bool(chance.clamp(0.0, 1.0));
                Value::Bool(if keep { *flag } else { !*flag })
            }
            Value::Object(map) => {
                let keys: Vec<&String> = map.keys().collect();
                let take = rule.count(&mut rng).min(keys.len());
                let picked: Map<String, Value> = keys
                    .choose_multiple(&mut rng, take)
                    .map(|key| ((*key).clone(), map[key.as_str()].clone()))
                    .collect();
                self.object(path, &picked)
            }
            Value::Array(items) => self.array(path, rule, items),
            Value::Null => Value::Null,
        }
    }

    fn number(&mut self, path: &str, rule: Rule, base: &Number) -> Value {
        if let Some(step) = rule.step {
            let counter = self.counters.entry(path.to_string()).or_insert(0);
            let emitted = *counter;
            *counter += 1;
            return match base.as_i64() {
                Some(base) => Value::from(base + step * emitted),
                None => Value::from(base.as_f64().unwrap_or_default() + (step * emitted) as f64),
            };
        }

        let mut rng = rand::thread_rng();
        let integer = rng.gen_range(rule.min..=rule.max);
        let Some((low, high)) = rule.decimals else {
            return Value::from(integer);
        };

        let digits = rng.gen_range(low..=high).min(10);
        if digits == 0 {
            return Value::from(integer);
        }
        // Last digit is non-zero so the requested precision survives parsing.
        let fraction: String = (0..digits)
            .map(|i| {
                let floor = if i + 1 == digits { 1 } else { 0 };
                char::from(b'0' + rng.gen_range(floor..10u8))
            })
            .collect();
        format!("{integer}.{fraction}")
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(integer))
    }

    fn array(&mut self, path: &str, rule: Rule, items: &[Value]) -> Value {
        if items.is_empty() {
            return Value::Array(Vec::new());
        }
        let item_path = format!("{path}[]");

        if let Some(step) = rule.step {
            let cursor = self.cursors.entry(path.to_string()).or_insert(0);
            let index = *cursor % items.len();
            *cursor = cursor.wrapping_add(step.max(1) as usize);
            return self.value(&item_path, &items[index]);
        }

        let mut rng = rand::thread_rng();
        if !rule.ranged && rule.min == 1 && rule.decimals.is_none() {
            let picked = items.choose(&mut rng).cloned().unwrap_or(Value::Null);
            return self.value(&item_path, &picked);
        }

        let times = rule.count(&mut rng);
        let mut out = Vec::with_capacity(items.len() * times);
        for _ in 0..times {
            for item in items {
                out.push(self.value(&item_path, item));
            }
        }
        Value::Array(out)
    }
}

fn render_string(raw: &str) -> Value {
    if let Some((name, args, rest)) = parse_placeholder(raw) {
        if rest.is_empty() {
            if let Some(value) = placeholder(name, &args) {
                return value;
            }
        }
    }
    Value::String(interpolate(raw))
}

fn interpolate(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        let candidate = &rest[at..];
        let rendered = parse_placeholder(candidate)
            .and_then(|(name, args, tail)| placeholder(name, &args).map(|value| (value, tail)));
        match rendered {
            Some((value, tail)) => {
                match value {
                    Value::String(text) => out.push_str(&text),
                    other => out.push_str(&other.to_string()),
                }
                rest = tail;
            }
            None => {
                out.push('@');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Splits `@name(arg, arg)tail` into its parts.
fn parse_placeholder(input: &str) -> Option<(&str, Vec<&str>, &str)> {
    let body = input.strip_prefix('@')?;
    if !body.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let end = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(body.len());
    let (name, rest) = body.split_at(end);

    if let Some(args_body) = rest.strip_prefix('(') {
        let close = args_body.find(')')?;
        let args = args_body[..close]
            .split(',')
            .map(str::trim)
            .filter(|arg| !arg.is_empty())
            .collect();
        return Some((name, args, &args_body[close + 1..]));
    }

    Some((name, Vec::new(), rest))
}

fn placeholder(name: &str, args: &[&str]) -> Option<Value> {
    let mut rng = rand::thread_rng();
    let int_arg = |index: usize, default: i64| {
        args.get(index)
            .and_then(|arg| arg.parse::<i64>().ok())
            .unwrap_or(default)
    };

    let value = match name.to_ascii_lowercase().as_str() {
        "name" | "cname" => json!(Name().fake::<String>()),
        "first" | "cfirst" => json!(FirstName().fake::<String>()),
        "last" | "clast" => json!(LastName().fake::<String>()),
        "email" => json!(SafeEmail().fake::<String>()),
        "word" | "cword" => json!(Word().fake::<String>()),
        "title" | "ctitle" => json!(Sentence(2..5).fake::<String>().trim_end_matches('.')),
        "sentence" | "csentence" => json!(Sentence(3..10).fake::<String>()),
        "paragraph" | "cparagraph" => json!(Paragraph(1..3).fake::<String>()),
        "city" => json!(CityName().fake::<String>()),
        "country" => json!(CountryName().fake::<String>()),
        "zip" => json!(PostCode().fake::<String>()),
        "phone" => json!(PhoneNumber().fake::<String>()),
        "ip" => json!(IPv4().fake::<String>()),
        "url" => json!(format!(
            "https://{}.example.com/{}",
            Word().fake::<String>(),
            Word().fake::<String>()
        )),
        "guid" | "uuid" => json!(uuid::Uuid::new_v4().to_string()),
        "id" => json!((0..18)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect::<String>()),
        "integer" | "int" => {
            let (min, max) = ordered(int_arg(0, -10_000), int_arg(1, 10_000));
            json!(rng.gen_range(min..=max))
        }
        "natural" => {
            let (min, max) = ordered(int_arg(0, 0).max(0), int_arg(1, 10_000).max(0));
            json!(rng.gen_range(min..=max))
        }
        "float" => {
            let (min, max) = ordered(int_arg(0, 0), int_arg(1, 1_000));
            let value: f64 = rng.gen_range(min as f64..=max as f64);
            json!((value * 100.0).round() / 100.0)
        }
        "boolean" | "bool" => json!(rng.gen_bool(0.5)),
        "date" => json!(random_datetime(&mut rng).format("%Y-%m-%d").to_string()),
        "datetime" => json!(random_datetime(&mut rng).format("%Y-%m-%d %H:%M:%S").to_string()),
        "time" => json!(random_datetime(&mut rng).format("%H:%M:%S").to_string()),
        "now" => json!(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        _ => return None,
    };

    Some(value)
}

fn ordered(a: i64, b: i64) -> (i64, i64) {
    (a.min(b), a.max(b))
}

fn random_datetime(rng: &mut impl Rng) -> chrono::DateTime<chrono::Local> {
    let offset = rng.gen_range(0..365 * 24 * 3600);
    chrono::Local::now() - chrono::Duration::seconds(offset)
}
