//! Population statistics over close-price series.
//!
//! Every function uses population (divide-by-n) formulas. Undefined results
//! (empty input, zero variance, no overlap) are `None`, never NaN.

use chrono::NaiveDate;
use std::collections::HashMap;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn population_variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some(sum_sq / values.len() as f64)
}

pub fn population_stddev(values: &[f64]) -> Option<f64> {
    population_variance(values).map(f64::sqrt)
}

pub fn population_covariance(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let sum: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mx) * (y - my))
        .sum();
    Some(sum / xs.len() as f64)
}

/// stddev / mean; `None` when the mean is zero.
pub fn coefficient_of_variation(closes: &[f64]) -> Option<f64> {
    let m = mean(closes)?;
    if m.abs() < f64::EPSILON {
        return None;
    }
    finite(population_stddev(closes)? / m)
}

/// Pearson correlation; `None` for fewer than two points or a flat series.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let cov = population_covariance(xs, ys)?;
    let sx = population_stddev(xs)?;
    let sy = population_stddev(ys)?;
    if sx < f64::EPSILON || sy < f64::EPSILON {
        return None;
    }
    finite((cov / (sx * sy)).clamp(-1.0, 1.0))
}

/// Inner join of two dated series on date, in date order.
pub fn align_by_date(a: &[(NaiveDate, f64)], b: &[(NaiveDate, f64)]) -> (Vec<f64>, Vec<f64>) {
    let lookup: HashMap<NaiveDate, f64> = b.iter().copied().collect();
    let mut pairs: Vec<(NaiveDate, f64, f64)> = a
        .iter()
        .filter_map(|(date, x)| lookup.get(date).map(|y| (*date, *x, *y)))
        .collect();
    pairs.sort_by_key(|(date, _, _)| *date);
    pairs.into_iter().map(|(_, x, y)| (x, y)).unzip()
}

/// cov(stock, benchmark) / var(benchmark) over the dates both series share.
pub fn beta(stock: &[(NaiveDate, f64)], benchmark: &[(NaiveDate, f64)]) -> Option<f64> {
    let (s, b) = align_by_date(stock, benchmark);
    let var_b = population_variance(&b)?;
    if var_b < f64::EPSILON {
        return None;
    }
    finite(population_covariance(&s, &b)? / var_b)
}

/// Pearson correlation of two dated series over their shared dates.
pub fn correlation(a: &[(NaiveDate, f64)], b: &[(NaiveDate, f64)]) -> Option<f64> {
    let (x, y) = align_by_date(a, b);
    pearson(&x, &y)
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
