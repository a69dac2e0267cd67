// tests/chunking_property.rs

use proptest::prelude::*;

use crawlflow::errors::CrawlflowError;
use crawlflow::pipeline::batch::ClassificationRequest;
use crawlflow::pipeline::chunk::{array_encoded_len, chunk_requests, fits_alone};

fn request(key: &str, payload_len: usize) -> ClassificationRequest {
    ClassificationRequest {
        key: key.to_string(),
        png_base64: "A".repeat(payload_len),
        context_text: String::new(),
    }
}

fn encoded_chunk_len(chunk: &[ClassificationRequest]) -> usize {
    let lens: Vec<usize> = chunk.iter().map(|r| r.encoded_len().unwrap()).collect();
    array_encoded_len(&lens)
}

#[test]
fn array_length_counts_brackets_and_commas() {
    assert_eq!(array_encoded_len(&[]), 2);
    assert_eq!(array_encoded_len(&[10]), 12);
    assert_eq!(array_encoded_len(&[10, 20, 30]), 64);

    let pair = vec![request("a", 3), request("b", 5)];
    assert_eq!(serde_json::to_string(&pair).unwrap().len(), encoded_chunk_len(&pair));
}

#[test]
fn empty_input_yields_no_chunks() {
    assert!(chunk_requests(Vec::new(), 100).unwrap().is_empty());
}

#[test]
fn oversized_request_names_its_key() {
    let big = request("https://img/huge.png", 500);
    assert!(!fits_alone(&big, 200).unwrap());

    let err = chunk_requests(vec![request("small", 1), big], 200).unwrap_err();
    match err {
        CrawlflowError::PayloadTooLarge { key, max, .. } => {
            assert_eq!(key, "https://img/huge.png");
            assert_eq!(max, 200);
        }
        other => panic!("expected PayloadTooLarge, got {other:?}"),
    }
}

#[test]
fn exact_fit_stays_in_one_chunk() {
    let requests = vec![request("a", 10), request("b", 10)];
    let exact = encoded_chunk_len(&requests);

    assert_eq!(chunk_requests(requests.clone(), exact).unwrap().len(), 1);
    assert_eq!(chunk_requests(requests, exact - 1).unwrap().len(), 2);
}

proptest! {
    #[test]
    fn chunks_preserve_order_and_respect_the_limit(
        sizes in proptest::collection::vec(0usize..120, 0..40),
        max_bytes in 200usize..1_000,
    ) {
        let requests: Vec<ClassificationRequest> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| request(&format!("k{i}"), *size))
            .collect();
        let keys: Vec<String> = requests.iter().map(|r| r.key.clone()).collect();

        let chunks = chunk_requests(requests, max_bytes).unwrap();

        for chunk in &chunks {
            prop_assert!(!chunk.is_empty());
            prop_assert!(encoded_chunk_len(chunk) <= max_bytes);
        }
        let flattened: Vec<String> = chunks.iter().flatten().map(|r| r.key.clone()).collect();
        prop_assert_eq!(flattened, keys);
    }

    #[test]
    fn adjacent_chunks_could_not_have_been_merged(
        sizes in proptest::collection::vec(0usize..120, 1..40),
        max_bytes in 200usize..1_000,
    ) {
        let requests: Vec<ClassificationRequest> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| request(&format!("k{i}"), *size))
            .collect();

        let chunks = chunk_requests(requests, max_bytes).unwrap();
        for pair in chunks.windows(2) {
            let mut grown = pair[0].clone();
            grown.push(pair[1][0].clone());
            prop_assert!(encoded_chunk_len(&grown) > max_bytes);
        }
    }
}
