//! Engine-level tests over an on-disk registry with scripted network collaborators.

use chrono::NaiveDate;
use nspider_core::fetcher::{CandidateSummary, DatasetProfile};
use nspider_core::{
    DatasetRecord, DownloadStatus, EngineError, FetchedDetails, PublicationRecord, QueryTemplate,
    SourceRecord,
};
use tempfile::TempDir;

mod support;
use support::stubs::{StubBrowser, StubFetcher, open_engine};

const PMC_PDF: &str = "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC3/pdf/x.pdf";

fn linked_publication() -> FetchedDetails {
    FetchedDetails {
        publications: vec![PublicationRecord::new(
            "10.1/x",
            "23335597",
            true,
            "Motor neuron atlas",
            "We profile motor neurons.",
        )],
        sources: vec![SourceRecord::new("10.1/x", "www.ncbi.nlm.nih.gov", PMC_PDF)],
    }
}

#[tokio::test]
async fn test_directly_linked_dataset_end_to_end() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::default().respond(
        QueryTemplate::LinkedToDataset,
        "200011474",
        linked_publication(),
    );
    let browser = StubBrowser::new(&dir.path().join("publication")).download(PMC_PDF, b"%PDF-1.4 x");
    let mut engine = open_engine(dir.path(), fetcher, browser).await;

    let external_id = engine.external_id_for_dataset("200011474").await.unwrap();

    assert_eq!(external_id.as_deref(), Some("23335597"));
    assert_eq!(
        engine.registry().datasets(),
        &[DatasetRecord::linked("200011474", "10.1/x")]
    );
    let publication = engine.publication_for_dataset("200011474").unwrap();
    assert_eq!(publication.download_status, DownloadStatus::Success);

    let stored = engine.load_publication("10.1_slashx").await.unwrap().unwrap();
    assert_eq!(stored, dir.path().join("publication").join("10.1_slashx.pdf"));
    assert!(stored.exists());
    assert!(!dir.path().join("publication").join("x.pdf").exists());
}

#[tokio::test]
async fn test_registry_survives_reopen_after_commit() {
    let dir = TempDir::new().unwrap();
    {
        let fetcher = StubFetcher::default().respond(
            QueryTemplate::LinkedToDataset,
            "200011474",
            linked_publication(),
        );
        let browser = StubBrowser::new(&dir.path().join("publication")).download(PMC_PDF, b"%PDF-1.4 x");
        let mut engine = open_engine(dir.path(), fetcher, browser).await;
        engine.resolve_dataset("200011474").await.unwrap();
        engine.commit().await.unwrap();
    }

    let fetcher = StubFetcher::default();
    let calls = fetcher.calls.clone();
    let browser = StubBrowser::new(&dir.path().join("publication"));
    let mut engine = open_engine(dir.path(), fetcher, browser).await;

    assert_eq!(
        engine.resolve_dataset("200011474").await.unwrap().as_deref(),
        Some("10.1/x")
    );
    assert!(calls.lock().unwrap().is_empty(), "cached link must not hit the network");
    assert_eq!(
        engine.dataset_for_publication("10.1_slashx").map(|d| d.dataset_id.as_str()),
        Some("200011474")
    );
    assert_eq!(engine.registry().sources().len(), 1);
    assert!(engine.load_publication("23335597").await.unwrap().is_some());
}

#[tokio::test]
async fn test_uncommitted_changes_are_not_persisted() {
    let dir = TempDir::new().unwrap();
    {
        let fetcher = StubFetcher::default().respond(
            QueryTemplate::LinkedToDataset,
            "200011474",
            linked_publication(),
        );
        let browser = StubBrowser::new(&dir.path().join("publication"));
        let mut engine = open_engine(dir.path(), fetcher, browser).await;
        engine.resolve_dataset("200011474").await.unwrap();
    }

    let engine = open_engine(
        dir.path(),
        StubFetcher::default(),
        StubBrowser::new(&dir.path().join("publication")),
    )
    .await;
    assert!(engine.registry().datasets().is_empty());
    assert!(engine.registry().publications().is_empty());
}

#[tokio::test]
async fn test_full_text_verification_picks_quoting_candidate() {
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("publication");
    let a_pdf = "https://a.example/files/a.pdf";
    let b_pdf = "https://b.example/files/b.pdf";

    let fetcher = StubFetcher::default()
        .profile(
            "200040000",
            DatasetProfile {
                accession: "GSE43696".to_string(),
                title: "airway epithelium in asthma".to_string(),
                released: NaiveDate::from_ymd_opt(2013, 6, 1),
                contributors: vec!["Smith J".to_string()],
            },
        )
        .listing(
            "Smith J",
            vec![
                CandidateSummary {
                    external_id: "111".to_string(),
                    authors: vec!["Smith J".to_string(), "Lee A".to_string()],
                    published: NaiveDate::from_ymd_opt(2013, 5, 1),
                },
                CandidateSummary {
                    external_id: "222".to_string(),
                    authors: vec!["Smith J".to_string()],
                    published: NaiveDate::from_ymd_opt(2013, 1, 1),
                },
                CandidateSummary {
                    external_id: "333".to_string(),
                    authors: vec!["Brown K".to_string()],
                    published: NaiveDate::from_ymd_opt(2013, 6, 1),
                },
            ],
        )
        .respond(
            QueryTemplate::ByExternalId,
            "111",
            FetchedDetails {
                publications: vec![PublicationRecord::new(
                    "10.1/a", "111", true, "A", "airway epithelium in asthma",
                )],
                sources: vec![SourceRecord::new("10.1/a", "a.example", a_pdf)],
            },
        )
        .respond(
            QueryTemplate::ByExternalId,
            "222",
            FetchedDetails {
                publications: vec![PublicationRecord::new("10.1/b", "222", true, "B", "lungs")],
                sources: vec![SourceRecord::new("10.1/b", "b.example", b_pdf)],
            },
        );
    let calls = fetcher.calls.clone();
    let browser = StubBrowser::new(&downloads)
        .download(a_pdf, b"%PDF unrelated cohort")
        .download(b_pdf, b"%PDF data deposited as GSE43696");
    let mut engine = open_engine(dir.path(), fetcher, browser).await;

    let doi = engine.resolve_dataset("200040000").await.unwrap();

    assert_eq!(doi.as_deref(), Some("10.1/b"));
    assert_eq!(engine.registry().publications().len(), 2);
    assert!(!calls.lock().unwrap().iter().any(|call| call.contains("333")));
    let text = engine.full_text("222").await.unwrap().unwrap();
    assert!(text.contains("GSE43696"));
}

#[tokio::test]
async fn test_unresolved_dataset_is_not_registered() {
    let dir = TempDir::new().unwrap();
    let mut engine = open_engine(
        dir.path(),
        StubFetcher::default(),
        StubBrowser::new(&dir.path().join("publication")),
    )
    .await;

    assert_eq!(engine.resolve_dataset("200099999").await.unwrap(), None);
    assert_eq!(engine.external_id_for_dataset("200099999").await.unwrap(), None);
    assert!(engine.registry().datasets().is_empty());
    assert!(engine.publication_for_dataset("200099999").is_none());
}

#[tokio::test]
async fn test_invalid_identifiers_are_rejected() {
    let dir = TempDir::new().unwrap();
    let mut engine = open_engine(
        dir.path(),
        StubFetcher::default(),
        StubBrowser::new(&dir.path().join("publication")),
    )
    .await;

    assert!(matches!(
        engine.load_publication("not an identifier").await,
        Err(EngineError::InvalidIdentifier { .. })
    ));
    assert!(matches!(
        engine.resolve_dataset("GDS4242").await,
        Err(EngineError::InvalidDatasetId { .. })
    ));
}

#[tokio::test]
async fn test_unknown_pmid_is_fetched_and_downloaded_on_load() {
    let dir = TempDir::new().unwrap();
    let pdf = "https://journals.example/article/ddt076.pdf";
    let fetcher = StubFetcher::default().respond(
        QueryTemplate::ByExternalId,
        "23390130",
        FetchedDetails {
            publications: vec![PublicationRecord::new(
                "10.1093/hmg/ddt076",
                "23390130",
                true,
                "T",
                "A",
            )],
            sources: vec![SourceRecord::new("10.1093/hmg/ddt076", "journals.example", pdf)],
        },
    );
    let browser = StubBrowser::new(&dir.path().join("publication")).download(pdf, b"%PDF");
    let mut engine = open_engine(dir.path(), fetcher, browser).await;

    let stored = engine.load_publication("23390130").await.unwrap().unwrap();

    assert!(stored.ends_with("10.1093_slashhmg_slashddt076.pdf"));
    assert!(stored.exists());
    assert!(engine.dataset_for_publication("10.1093/hmg/ddt076").is_none());
}

#[tokio::test]
async fn test_closed_access_publication_has_no_stored_pdf() {
    let dir = TempDir::new().unwrap();
    let fetcher = StubFetcher::default().respond(
        QueryTemplate::ByExternalId,
        "999",
        FetchedDetails {
            publications: vec![PublicationRecord::new("10.1/closed", "999", false, "T", "A")],
            sources: vec![SourceRecord::new("10.1/closed", "a.example", "https://a.example/x.pdf")],
        },
    );
    let browser = StubBrowser::new(&dir.path().join("publication"));
    let opened = browser.opened.clone();
    let mut engine = open_engine(dir.path(), fetcher, browser).await;

    assert_eq!(engine.load_publication("999").await.unwrap(), None);
    assert!(opened.lock().unwrap().is_empty());
    assert_eq!(
        engine.registry().lookup_publication("10.1/closed").unwrap().download_status,
        DownloadStatus::Unknown
    );
}
