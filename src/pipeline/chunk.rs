// src/pipeline/chunk.rs

use crate::errors::{CrawlflowError, Result};
use crate::pipeline::batch::ClassificationRequest;

/// Encoded size of a JSON array holding items of the given encoded sizes.
pub fn array_encoded_len(item_lens: &[usize]) -> usize {
    let commas = item_lens.len().saturating_sub(1);
    2 + item_lens.iter().sum::<usize>() + commas
}

/// Split `requests` into consecutive chunks whose JSON array encoding stays
/// within `max_bytes`.
///
/// Order is preserved and no chunk is empty. A request that does not fit
/// even on its own fails the whole call with
/// [`CrawlflowError::PayloadTooLarge`]; filter those out first.
pub fn chunk_requests(
    requests: Vec<ClassificationRequest>,
    max_bytes: usize,
) -> Result<Vec<Vec<ClassificationRequest>>> {
    let mut chunks = Vec::new();
    let mut current: Vec<ClassificationRequest> = Vec::new();
    // Encoded size of `current` as an array.
    let mut current_len = 2;

    for request in requests {
        let len = request.encoded_len()?;
        if array_encoded_len(&[len]) > max_bytes {
            return Err(CrawlflowError::PayloadTooLarge {
                key: request.key,
                size: len,
                max: max_bytes,
            });
        }

        let added = if current.is_empty() { len } else { len + 1 };
        if current_len + added > max_bytes {
            chunks.push(std::mem::take(&mut current));
            current_len = 2;
            current_len += len;
        } else {
            current_len += added;
        }
        current.push(request);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

/// Whether `request` can be submitted at all under `max_bytes`.
pub fn fits_alone(request: &ClassificationRequest, max_bytes: usize) -> Result<bool> {
    Ok(array_encoded_len(&[request.encoded_len()?]) <= max_bytes)
}
