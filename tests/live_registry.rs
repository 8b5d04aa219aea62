use filingest::{
    CompanyOperations, FilingOperations, FormType, IngestError, ListOptions, Registry,
};

#[tokio::test]
#[ignore]
async fn resolve_cik() {
    let registry = Registry::new("test_agent example@example.com").unwrap();
    let cik = registry.resolve_cik("AAPL").await.unwrap();
    assert_eq!(cik, 320193);
}

#[tokio::test]
#[ignore]
async fn resolve_cik_not_found() {
    let registry = Registry::new("test_agent example@example.com").unwrap();
    let result = registry.resolve_cik("NOTATICKER").await;
    assert!(matches!(result, Err(IngestError::TickerNotFound)));
}

#[tokio::test]
#[ignore]
async fn list_recent_annual_reports() {
    let registry = Registry::new("test_agent example@example.com").unwrap();
    let options = ListOptions::new()
        .with_form_type(FormType::AnnualReport)
        .with_limit(3);

    let filings = registry.list_filings(320193, &options).await.unwrap();
    assert!(!filings.is_empty());
    assert!(filings.len() <= 3);
    assert!(
        filings
            .iter()
            .all(|f| f.form_type == FormType::AnnualReport)
    );
    assert!(!filings[0].accession_number.is_empty());
}

#[tokio::test]
#[ignore]
async fn submissions_not_found() {
    let registry = Registry::new("test_agent example@example.com").unwrap();
    let result = registry.submissions(0).await;
    assert!(matches!(result, Err(IngestError::NotFound)));
}

#[tokio::test]
#[ignore]
async fn download_primary_document() {
    let registry = Registry::new("test_agent example@example.com").unwrap();
    let options = ListOptions::new()
        .with_form_type(FormType::AnnualReport)
        .with_limit(1);

    let filings = registry.list_filings(320193, &options).await.unwrap();
    let document = registry.download_document(&filings[0]).await.unwrap();
    assert!(document.len() > 1000);
}
