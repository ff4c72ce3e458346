//! Reshape functions - wide per-region series into tidy (date, region, value) rows
//! Pure functions, no I/O

use crate::ingestion::types::{Period, ReshapeError, SeriesCollection, TidyRow};
use tracing::{debug, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Melt a series collection into tidy rows.
///
/// Rows are region-major: every date of the first region (oldest first), then
/// every date of the next region, following input order. A region without a
/// value for some period simply has no row for it.
pub fn reshape(collection: &SeriesCollection) -> Result<Vec<TidyRow>, ReshapeError> {
    let periods = collection.periods();
    let dates: Vec<(Period, String)> = periods
        .iter()
        .map(|p| (*p, p.to_display_date()))
        .collect();

    let mut gaps = 0usize;

    let rows = collection.regions.iter().try_fold(
        Vec::with_capacity(collection.regions.len() * periods.len()),
        |mut rows, region| {
            let location = transliterate(&region.name);

            for (period, date) in &dates {
                let Some(value) = region.values.get(period) else {
                    gaps += 1;
                    continue;
                };

                let value = decimal_comma(value).ok_or_else(|| ReshapeError::NonNumericValue {
                    region: region.name.clone(),
                    period: *period,
                    value: value.clone(),
                })?;

                rows.push(TidyRow {
                    date: date.clone(),
                    location: location.clone(),
                    value,
                });
            }

            Ok::<_, ReshapeError>(rows)
        },
    )?;

    if gaps > 0 {
        warn!(
            "{} (region, period) cells missing across {} regions; no rows emitted for them",
            gaps,
            collection.regions.len()
        );
    }

    debug!(
        "Reshaped {} regions x {} periods into {} rows",
        collection.regions.len(),
        periods.len(),
        rows.len()
    );

    Ok(rows)
}

/// Strip accents and map remaining non-ASCII letters to ASCII.
/// Characters with no ASCII equivalent are dropped.
pub fn transliterate(name: &str) -> String {
    let mut out = String::with_capacity(name.len());

    for c in name.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii() {
            out.push(c);
        } else if let Some(ascii) = ascii_fallback(c) {
            out.push_str(ascii);
        }
    }

    out
}

/// Letters NFKD leaves intact
fn ascii_fallback(c: char) -> Option<&'static str> {
    let ascii = match c {
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'ø' => "o",
        'Ø' => "O",
        'đ' | 'ð' => "d",
        'Đ' | 'Ð' => "D",
        'ł' => "l",
        'Ł' => "L",
        'œ' => "oe",
        'Œ' => "OE",
        'þ' => "th",
        'Þ' => "TH",
        'ı' => "i",
        _ => return None,
    };
    Some(ascii)
}

/// Rewrite `123.45` as `123,45` without parsing it as a number.
/// Returns None unless the text is an optionally signed decimal.
pub fn decimal_comma(value: &str) -> Option<String> {
    let unsigned = value.strip_prefix(['-', '+']).unwrap_or(value);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (unsigned, None),
    };

    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    if !is_digits(int_part) || !frac_part.map_or(true, is_digits) {
        return None;
    }

    Some(value.replace('.', ","))
}
