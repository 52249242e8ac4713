//! Reader for FCIDUMP integral files

use crate::integrals::DenseIntegrals;
use crate::linalg::Tensor4;
use color_eyre::eyre::{ensure, eyre, Result, WrapErr};
use nalgebra::DMatrix;
use std::collections::HashMap;
use std::fs;
use tracing::info;

/// Integrals over an orthonormal orbital basis
#[derive(Debug, Clone)]
pub struct Fcidump {
    pub norb: usize,
    pub nelec: usize,
    pub ms2: i64,
    /// Zero-based irreps, `None` when the file carries no ORBSYM
    pub orbsym: Option<Vec<u8>>,
    pub h1: DMatrix<f64>,
    pub eri: Tensor4,
    pub e_nuc: f64,
}

const KNOWN_KEYS: [&str; 5] = ["NORB", "NELEC", "MS2", "ORBSYM", "ISYM"];

fn parse_header(header: &str) -> Result<HashMap<String, Vec<i64>>> {
    let cleaned = header.replace(',', " ");
    let mut fields: HashMap<String, Vec<i64>> = HashMap::new();
    let mut key: Option<String> = None;
    for tok in cleaned.split_whitespace() {
        let value = match tok.split_once('=') {
            Some((name, rest)) => {
                let name = name.trim().to_uppercase();
                fields.entry(name.clone()).or_default();
                key = Some(name);
                rest
            }
            None => tok,
        };
        if value.is_empty() {
            continue;
        }
        let Some(k) = key.as_ref() else {
            return Err(eyre!("FCIDUMP header value '{}' precedes every key", value));
        };
        if !KNOWN_KEYS.contains(&k.as_str()) {
            continue;
        }
        let v = value
            .parse::<i64>()
            .wrap_err_with(|| format!("Invalid value '{}' for FCIDUMP key {}", value, k))?;
        fields.entry(k.clone()).or_default().push(v);
    }
    Ok(fields)
}

fn single(fields: &HashMap<String, Vec<i64>>, key: &str) -> Result<i64> {
    fields
        .get(key)
        .and_then(|v| v.first().copied())
        .ok_or_else(|| eyre!("FCIDUMP header has no {}", key))
}

fn index(tok: &str, norb: usize) -> Result<usize> {
    let i: usize = tok.parse().wrap_err_with(|| format!("Invalid orbital index '{}'", tok))?;
    ensure!(i <= norb, "Orbital index {} exceeds NORB = {}", i, norb);
    Ok(i)
}

impl Fcidump {
    pub fn read(path: &str) -> Result<Self> {
        info!("Reading integrals from FCIDUMP: {}", path);
        let text = fs::read_to_string(path).wrap_err_with(|| format!("Unable to read FCIDUMP file: {}", path))?;
        Self::parse(&text).wrap_err_with(|| format!("Failed to parse FCIDUMP file: {}", path))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let upper = text.to_uppercase();
        let start = upper.find("&FCI").ok_or_else(|| eyre!("Missing &FCI namelist"))?;
        let (end, body_start) = match upper[start..].find("&END") {
            Some(e) => (start + e, start + e + 4),
            None => {
                let e = upper[start..]
                    .find('/')
                    .ok_or_else(|| eyre!("Unterminated &FCI namelist"))?;
                (start + e, start + e + 1)
            }
        };
        let fields = parse_header(&text[start + 4..end])?;
        let norb = usize::try_from(single(&fields, "NORB")?).wrap_err("NORB must be non-negative")?;
        let nelec = usize::try_from(single(&fields, "NELEC")?).wrap_err("NELEC must be non-negative")?;
        let ms2 = fields.get("MS2").and_then(|v| v.first().copied()).unwrap_or(0);
        let orbsym = match fields.get("ORBSYM") {
            Some(labels) if !labels.is_empty() => {
                ensure!(
                    labels.len() == norb,
                    "ORBSYM has {} labels for {} orbitals",
                    labels.len(),
                    norb
                );
                let zero_based = labels
                    .iter()
                    .map(|&l| u8::try_from(l - 1).wrap_err_with(|| format!("Invalid irrep label {}", l)))
                    .collect::<Result<Vec<u8>>>()?;
                Some(zero_based)
            }
            _ => None,
        };

        let mut h1 = DMatrix::zeros(norb, norb);
        let mut eri = Tensor4::cubic(norb);
        let mut e_nuc = 0.0;
        for (lineno, line) in text[body_start..].lines().enumerate() {
            let toks: Vec<&str> = line.split_whitespace().collect();
            if toks.is_empty() {
                continue;
            }
            ensure!(
                toks.len() == 5,
                "Integral line {} has {} fields, expected 5",
                lineno + 1,
                toks.len()
            );
            let value: f64 = toks[0]
                .replace(['D', 'd'], "E")
                .parse()
                .wrap_err_with(|| format!("Invalid integral value '{}'", toks[0]))?;
            let [i, j, k, l] = [
                index(toks[1], norb)?,
                index(toks[2], norb)?,
                index(toks[3], norb)?,
                index(toks[4], norb)?,
            ];
            match (i, j, k, l) {
                (0, 0, 0, 0) => e_nuc = value,
                (_, 0, 0, 0) => {}
                (i, j, 0, 0) if i > 0 && j > 0 => {
                    h1[(i - 1, j - 1)] = value;
                    h1[(j - 1, i - 1)] = value;
                }
                (i, j, k, l) if i > 0 && j > 0 && k > 0 && l > 0 => {
                    let (p, q, r, s) = (i - 1, j - 1, k - 1, l - 1);
                    for (a, b, c, d) in [
                        (p, q, r, s),
                        (q, p, r, s),
                        (p, q, s, r),
                        (q, p, s, r),
                        (r, s, p, q),
                        (s, r, p, q),
                        (r, s, q, p),
                        (s, r, q, p),
                    ] {
                        eri[(a, b, c, d)] = value;
                    }
                }
                _ => return Err(eyre!("Malformed index pattern on integral line {}", lineno + 1)),
            }
        }
        info!("FCIDUMP: NORB = {}, NELEC = {}, MS2 = {}", norb, nelec, ms2);
        Ok(Fcidump {
            norb,
            nelec,
            ms2,
            orbsym,
            h1,
            eri,
            e_nuc,
        })
    }

    pub fn integrals(&self) -> DenseIntegrals {
        DenseIntegrals::new(self.h1.clone(), self.eri.clone(), self.e_nuc)
    }
}
