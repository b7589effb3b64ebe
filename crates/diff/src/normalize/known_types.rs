//! Canonicalize fields of well-known Kubernetes value types (quantities, durations) so that
//! equivalent spellings such as `1000m` and `1` compare equal.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use drydock_core::doc;
use drydock_core::{override_key, Json, ResourceOverride};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use super::Normalizer;
use crate::DiffError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownType {
    Quantity,
    ResourceList,
    ResourceRequirements,
    Duration,
}

impl KnownType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "core/v1/Quantity" | "resource/Quantity" => Some(Self::Quantity),
            "core/v1/ResourceList" => Some(Self::ResourceList),
            "core/v1/ResourceRequirements" => Some(Self::ResourceRequirements),
            "meta/v1/Duration" => Some(Self::Duration),
            _ => None,
        }
    }
}

struct Field {
    path: SmallVec<[String; 6]>,
    ty: KnownType,
}

pub struct KnownTypesNormalizer {
    fields: FxHashMap<String, Vec<Field>>,
}

impl KnownTypesNormalizer {
    pub fn new(overrides: &BTreeMap<String, ResourceOverride>) -> Result<Self, DiffError> {
        let mut fields: FxHashMap<String, Vec<Field>> = FxHashMap::default();
        for (key, o) in overrides {
            for f in &o.known_type_fields {
                let ty = KnownType::parse(&f.type_name).ok_or_else(|| {
                    DiffError::Normalizer(format!("unsupported known type {:?} for field {:?} of {key}", f.type_name, f.field))
                })?;
                let path = f.field.split('.').map(|s| s.trim_end_matches("[]").to_string()).collect();
                fields.entry(key.clone()).or_default().push(Field { path, ty });
            }
        }
        Ok(Self { fields })
    }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }
}

impl Normalizer for KnownTypesNormalizer {
    fn normalize(&self, obj: &mut Json) -> Result<()> {
        let key = override_key(doc::group(obj), doc::kind(obj));
        let Some(fields) = self.fields.get(&key) else { return Ok(()) };
        for f in fields {
            visit(obj, &f.path, &mut |v| canonicalize(v, f.ty));
        }
        Ok(())
    }
}

/// Walk `path`, fanning out over arrays, and apply `f` at each match.
fn visit(v: &mut Json, path: &[String], f: &mut dyn FnMut(&mut Json)) {
    if let Json::Array(items) = v {
        for item in items.iter_mut() { visit(item, path, f); }
        return;
    }
    match path.split_first() {
        None => f(v),
        Some((head, rest)) => {
            if let Some(child) = v.get_mut(head.as_str()) { visit(child, rest, f); }
        }
    }
}

fn canonicalize(v: &mut Json, ty: KnownType) {
    match ty {
        KnownType::Quantity => canonicalize_scalar(v, canonical_quantity),
        KnownType::Duration => canonicalize_scalar(v, canonical_duration),
        KnownType::ResourceList => {
            if let Some(map) = v.as_object_mut() {
                for q in map.values_mut() { canonicalize_scalar(q, canonical_quantity); }
            }
        }
        KnownType::ResourceRequirements => {
            for section in ["limits", "requests"] {
                if let Some(list) = v.get_mut(section) { canonicalize(list, KnownType::ResourceList); }
            }
        }
    }
}

fn canonicalize_scalar(v: &mut Json, f: fn(&str) -> Result<String>) {
    let text = match v {
        Json::String(s) => s.clone(),
        Json::Number(n) => n.to_string(),
        _ => return,
    };
    match f(&text) {
        Ok(c) => *v = Json::String(c),
        Err(e) => debug!(value = %text, error = %e, "left value as is"),
    }
}

static QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?)([0-9]+(?:\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+|[KMGTPE]i|[numkMGTPE])?$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    BinarySI,
    DecimalSI,
    DecimalExponent,
}

fn pow10(n: u32) -> Option<i128> { 10i128.checked_pow(n) }

/// Canonical form of a Kubernetes resource quantity.
pub fn canonical_quantity(s: &str) -> Result<String> {
    let caps = QUANTITY_RE.captures(s.trim()).ok_or_else(|| anyhow!("invalid quantity {s:?}"))?;
    let overflow = || anyhow!("quantity {s:?} out of range");
    let negative = &caps[1] == "-";
    let number = &caps[2];
    let suffix = caps.get(3).map(|m| m.as_str()).unwrap_or("");

    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    let digits = format!("{int_part}{frac_part}");
    if digits.len() > 30 { return Err(anyhow!("quantity {s:?} too precise")); }
    let mut mant: i128 = if digits.is_empty() { 0 } else { digits.parse()? };
    let mut exp: i32 = -(frac_part.len() as i32);

    let format = match suffix {
        "" => Format::DecimalSI,
        s if s.ends_with('i') => {
            let power = match s { "Ki" => 1, "Mi" => 2, "Gi" => 3, "Ti" => 4, "Pi" => 5, _ => 6 };
            mant = mant.checked_mul(1024i128.pow(power)).ok_or_else(overflow)?;
            Format::BinarySI
        }
        s if s.len() > 1 && s.starts_with(|c: char| c == 'e' || c == 'E') => {
            exp = exp.checked_add(s[1..].parse::<i32>()?).ok_or_else(overflow)?;
            Format::DecimalExponent
        }
        s => {
            exp += match s { "n" => -9, "u" => -6, "m" => -3, "k" => 3, "M" => 6, "G" => 9, "T" => 12, "P" => 15, _ => 18 };
            Format::DecimalSI
        }
    };
    if negative { mant = -mant; }
    if mant == 0 { return Ok("0".to_string()); }
    while mant % 10 == 0 {
        mant /= 10;
        exp = exp.checked_add(1).ok_or_else(overflow)?;
    }

    if format == Format::BinarySI && exp >= 0 {
        let value = pow10(exp as u32).and_then(|p| mant.checked_mul(p)).ok_or_else(overflow)?;
        if value.abs() >= 1024 {
            let mut v = value;
            let mut power = 0usize;
            while power < 6 && v % 1024 == 0 {
                v /= 1024;
                power += 1;
            }
            let suffix = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"][power];
            return Ok(format!("{v}{suffix}"));
        }
    }

    let mut e3 = exp.div_euclid(3).checked_mul(3).ok_or_else(overflow)?;
    let mut m = pow10((exp - e3) as u32).and_then(|p| mant.checked_mul(p)).ok_or_else(overflow)?;
    if e3 < -9 {
        // Round away from zero to whole nano units. A scale past i128 dwarfs any mantissa.
        m = match (-9i32).checked_sub(e3).and_then(|d| pow10(d as u32)) {
            Some(scale) => {
                let q = m / scale;
                if m % scale == 0 { q } else if m > 0 { q + 1 } else { q - 1 }
            }
            None => m.signum(),
        };
        e3 = -9;
    } else if e3 > 18 && format != Format::DecimalExponent {
        m = pow10((e3 - 18) as u32).and_then(|p| m.checked_mul(p)).ok_or_else(overflow)?;
        e3 = 18;
    }
    let suffix = match format {
        Format::DecimalExponent if e3 == 0 => String::new(),
        Format::DecimalExponent => format!("e{e3}"),
        _ => match e3 {
            -9 => "n", -6 => "u", -3 => "m", 0 => "", 3 => "k", 6 => "M", 9 => "G", 12 => "T", 15 => "P", _ => "E",
        }
        .to_string(),
    };
    Ok(format!("{m}{suffix}"))
}

static DURATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]*)(?:\.([0-9]*))?(ns|us|µs|μs|ms|s|m|h)").unwrap());

const NS_PER_UNIT: [(&str, i128); 8] = [
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

fn parse_duration_ns(s: &str) -> Result<i128> {
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if body == "0" { return Ok(0); }
    if body.is_empty() { return Err(anyhow!("invalid duration {s:?}")); }
    let mut total: i128 = 0;
    let mut consumed = 0usize;
    for c in DURATION_RE.captures_iter(body) {
        let whole = c.get(0).ok_or_else(|| anyhow!("invalid duration {s:?}"))?;
        if whole.start() != consumed { return Err(anyhow!("invalid duration {s:?}")); }
        consumed = whole.end();
        let int = c.get(1).map_or("", |m| m.as_str());
        let frac = c.get(2).map_or("", |m| m.as_str());
        if int.is_empty() && frac.is_empty() { return Err(anyhow!("invalid duration {s:?}")); }
        let unit = NS_PER_UNIT.iter().find(|(u, _)| *u == &c[3]).map(|(_, n)| *n).unwrap_or(1);
        let int_v: i128 = if int.is_empty() { 0 } else { int.parse()? };
        total = int_v.checked_mul(unit).and_then(|v| total.checked_add(v)).ok_or_else(|| anyhow!("duration {s:?} out of range"))?;
        if !frac.is_empty() {
            let frac = &frac[..frac.len().min(18)];
            let frac_v: i128 = frac.parse()?;
            total += frac_v * unit / 10i128.pow(frac.len() as u32);
        }
        if total > i64::MAX as i128 { return Err(anyhow!("duration {s:?} out of range")); }
    }
    if consumed != body.len() { return Err(anyhow!("invalid duration {s:?}")); }
    Ok(if negative { -total } else { total })
}

/// Fractional digits of `v / 10^prec` with trailing zeros trimmed, and the integer part.
fn fmt_frac(v: i128, prec: u32) -> (String, i128) {
    let scale = 10i128.pow(prec);
    let frac = v % scale;
    if frac == 0 { return (String::new(), v / scale); }
    let digits = format!("{:0width$}", frac, width = prec as usize);
    (format!(".{}", digits.trim_end_matches('0')), v / scale)
}

/// Canonical text of a Kubernetes duration, e.g. `90m` becomes `1h30m0s`.
pub fn canonical_duration(s: &str) -> Result<String> {
    let ns = parse_duration_ns(s.trim())?;
    if ns == 0 { return Ok("0s".to_string()); }
    let sign = if ns < 0 { "-" } else { "" };
    let u = ns.abs();
    if u < 1_000_000_000 {
        let (prec, unit) = if u < 1_000 { (0, "ns") } else if u < 1_000_000 { (3, "µs") } else { (6, "ms") };
        let (frac, whole) = fmt_frac(u, prec);
        return Ok(format!("{sign}{whole}{frac}{unit}"));
    }
    let (frac, secs) = fmt_frac(u, 9);
    let mut out = format!("{}{frac}s", secs % 60);
    let mins = secs / 60;
    if mins > 0 {
        out = format!("{}m{out}", mins % 60);
        let hours = mins / 60;
        if hours > 0 { out = format!("{hours}h{out}"); }
    }
    Ok(format!("{sign}{out}"))
}
