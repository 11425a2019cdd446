//! Size-bounded chunking of batch payloads.
//!
//! A payload is cut into groups that must stay together (one age for aged
//! data, one row for change-log data) and the groups are packed greedily so
//! that every chunk's encoded payload stays within the size limit. The
//! number of groups per chunk is found with an exponential probe followed by
//! a binary search on the encoded size, so each chunk costs O(log n) encodes.

use super::batch::{row_age, Row};
use super::codec;
use crate::error::{Error, Result};
use std::ops::Range;

/// A chunk of an aged payload covering ages `[age, end_age]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgedChunk {
    /// First age covered.
    pub age: u64,
    /// Last age covered.
    pub end_age: u64,
    /// Rows of the source payload held by this chunk.
    pub rows: Range<usize>,
    /// Encoded payload.
    pub data: String,
}

/// A chunk of a change-log payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceChunk {
    /// Position of the chunk inside its batch.
    pub index: usize,
    /// Rows of the source payload held by this chunk.
    pub rows: Range<usize>,
    /// Encoded payload.
    pub data: String,
}

/// Splits an aged payload declared as `[age, end_age]`.
///
/// Rows with no `_AGE` belong to `age`. Ages must be non-decreasing and lie
/// inside the declared range; without `end_age` the range is `[age, age]`.
/// Each chunk but the last closes at the age of its last row; the last one
/// closes at the declared end.
pub fn aged_chunks(
    age: u64,
    end_age: Option<u64>,
    rows: &[Row],
    size_limit: u64,
) -> Result<Vec<AgedChunk>> {
    let end_age = end_age.unwrap_or(age);
    if end_age < age {
        return Err(Error::invalid_argument(format!("end_age {} precedes age {}", end_age, age)));
    }

    let mut groups: Vec<(u64, Range<usize>)> = Vec::new();
    for (pos, row) in rows.iter().enumerate() {
        let row_age = row_age(row)?.unwrap_or(age);
        if row_age < age || row_age > end_age {
            return Err(Error::invalid_argument(format!(
                "Row age {} outside of batch range [{}, {}]",
                row_age, age, end_age
            )));
        }
        match groups.last_mut() {
            Some((last, range)) if *last == row_age => range.end = pos + 1,
            Some((last, _)) if *last > row_age => {
                return Err(Error::invalid_argument(format!(
                    "Row ages must be non-decreasing: {} after {}",
                    row_age, last
                )));
            }
            _ => groups.push((row_age, pos..pos + 1)),
        }
    }

    if groups.is_empty() {
        let data = encode_within(rows, size_limit)?;
        return Ok(vec![AgedChunk { age, end_age, rows: 0..0, data }]);
    }

    let ranges: Vec<Range<usize>> = groups.iter().map(|(_, r)| r.clone()).collect();
    let packed = pack(rows, &ranges, size_limit)?;

    let last = packed.len() - 1;
    let mut next_age = age;
    let mut chunks = Vec::with_capacity(packed.len());
    for (i, (group_span, data)) in packed.into_iter().enumerate() {
        let chunk_end = if i == last { end_age } else { groups[group_span.end - 1].0 };
        let rows = ranges[group_span.start].start..ranges[group_span.end - 1].end;
        chunks.push(AgedChunk { age: next_age, end_age: chunk_end, rows, data });
        next_age = chunk_end + 1;
    }
    Ok(chunks)
}

/// Splits a change-log payload; rows are packed one by one.
pub fn sequence_chunks(rows: &[Row], size_limit: u64) -> Result<Vec<SequenceChunk>> {
    if rows.is_empty() {
        let data = encode_within(rows, size_limit)?;
        return Ok(vec![SequenceChunk { index: 0, rows: 0..0, data }]);
    }

    let ranges: Vec<Range<usize>> = (0..rows.len()).map(|i| i..i + 1).collect();
    Ok(pack(rows, &ranges, size_limit)?
        .into_iter()
        .enumerate()
        .map(|(index, (span, data))| SequenceChunk { index, rows: span, data })
        .collect())
}

/// Encodes rows and checks the result against the size limit.
pub fn encode_within(rows: &[Row], size_limit: u64) -> Result<String> {
    let data = codec::encode(rows)?;
    if data.len() as u64 > size_limit {
        return Err(Error::SizeBudget { size: data.len() as u64, limit: size_limit });
    }
    Ok(data)
}

/// Packs contiguous groups into chunks. Returns, per chunk, the span of
/// group indices it holds and its encoded payload.
fn pack(rows: &[Row], groups: &[Range<usize>], size_limit: u64) -> Result<Vec<(Range<usize>, String)>> {
    let try_encode = |start: usize, count: usize| -> Result<std::result::Result<String, u64>> {
        let span = groups[start].start..groups[start + count - 1].end;
        let data = codec::encode(&rows[span])?;
        if data.len() as u64 > size_limit {
            Ok(Err(data.len() as u64))
        } else {
            Ok(Ok(data))
        }
    };

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < groups.len() {
        let remaining = groups.len() - start;

        // Largest known fitting count and smallest known failing count.
        let mut lo = 1;
        let mut lo_data = match try_encode(start, 1)? {
            Ok(data) => data,
            Err(size) => return Err(Error::SizeBudget { size, limit: size_limit }),
        };
        let mut hi = remaining + 1;

        while lo + 1 < hi {
            let probe = if hi == remaining + 1 { (lo * 2).min(remaining) } else { lo + (hi - lo) / 2 };
            match try_encode(start, probe)? {
                Ok(data) => {
                    lo = probe;
                    lo_data = data;
                }
                Err(_) => hi = probe,
            }
        }

        chunks.push((start..start + lo, lo_data));
        start += lo;
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn aged_rows(ages: &[u64]) -> Vec<Row> {
        ages.iter()
            .enumerate()
            .map(|(i, age)| {
                serde_json::from_value(json!({
                    "id": i, "_AGE": age, "_NO": i, "name": format!("person-{:04}", i),
                    "city": "Lyon", "comment": format!("row {} at age {}", i, age)
                }))
                .unwrap()
            })
            .collect()
    }

    fn decode_all(rows: &[Row], chunks: &[(Range<usize>, &str)]) -> Vec<Row> {
        let mut out = Vec::new();
        for (range, data) in chunks {
            let decoded: Vec<Row> = codec::decode(data).unwrap();
            assert_eq!(decoded.as_slice(), &rows[range.clone()]);
            out.extend(decoded);
        }
        out
    }

    #[test]
    fn test_single_chunk_when_it_fits() {
        let rows = aged_rows(&[2, 3, 4]);
        let chunks = aged_chunks(2, Some(4), &rows, 1 << 20).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].age, chunks[0].end_age), (2, 4));
        assert_eq!(chunks[0].rows, 0..3);
    }

    #[test]
    fn test_aged_chunks_cover_declared_range() {
        let ages: Vec<u64> = (10..410).collect();
        let rows = aged_rows(&ages);
        let chunks = aged_chunks(10, Some(415), &rows, 1024).unwrap();
        assert!(chunks.len() > 1);

        assert_eq!(chunks[0].age, 10);
        assert_eq!(chunks.last().unwrap().end_age, 415);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_age + 1, pair[1].age);
            assert_eq!(pair[0].rows.end, pair[1].rows.start);
        }
        for chunk in &chunks {
            assert!(chunk.data.len() as u64 <= 1024);
        }

        let spans: Vec<_> = chunks.iter().map(|c| (c.rows.clone(), c.data.as_str())).collect();
        assert_eq!(decode_all(&rows, &spans), rows);
    }

    #[test]
    fn test_age_group_is_never_split() {
        let mut ages = vec![1u64; 40];
        ages.extend(vec![2u64; 40]);
        let rows = aged_rows(&ages);
        let first = encode_within(&rows[..40], u64::MAX).unwrap().len() as u64;
        let second = encode_within(&rows[40..], u64::MAX).unwrap().len() as u64;

        let chunks = aged_chunks(1, Some(2), &rows, first.max(second) + 8).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].rows, 0..40);
        assert_eq!((chunks[0].age, chunks[0].end_age), (1, 1));
        assert_eq!((chunks[1].age, chunks[1].end_age), (2, 2));
    }

    #[test]
    fn test_oversized_age_group_fails() {
        let rows = aged_rows(&[14; 400]);
        let err = aged_chunks(14, None, &rows, 1024).unwrap_err();
        assert!(err.is_size_budget());
        let err = aged_chunks(14, None, &rows, 2048).unwrap_err();
        assert!(err.is_size_budget());
    }

    #[test]
    fn test_rejects_out_of_range_and_unordered_ages() {
        let rows = aged_rows(&[5]);
        assert!(matches!(aged_chunks(6, Some(9), &rows, 4096), Err(Error::InvalidArgument(_))));

        let rows = aged_rows(&[3, 2]);
        assert!(matches!(aged_chunks(1, Some(9), &rows, 4096), Err(Error::InvalidArgument(_))));

        assert!(matches!(aged_chunks(9, Some(1), &[], 4096), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_payload_gives_one_chunk() {
        let chunks = aged_chunks(4, None, &[], 4096).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].age, chunks[0].end_age), (4, 4));

        let chunks = sequence_chunks(&[], 4096).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].rows.is_empty());
    }

    #[test]
    fn test_sequence_row_too_large() {
        let rows: Vec<Row> = vec![serde_json::from_value(json!({"a": 1})).unwrap()];
        assert!(sequence_chunks(&rows, 16).unwrap_err().is_size_budget());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_sequence_chunks_preserve_rows(
            values in proptest::collection::vec(("[a-z]{0,40}", any::<u32>()), 0..120),
            limit in 600u64..4096,
        ) {
            let rows: Vec<Row> = values
                .iter()
                .enumerate()
                .map(|(i, (s, n))| serde_json::from_value(json!({"_NO": i, "s": s, "n": n})).unwrap())
                .collect();

            let chunks = sequence_chunks(&rows, limit).unwrap();
            let mut recovered = Vec::new();
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert!(chunk.data.len() as u64 <= limit);
                let decoded: Vec<Row> = codec::decode(&chunk.data).unwrap();
                recovered.extend(decoded);
            }
            prop_assert_eq!(recovered, rows);
        }
    }
}
