mod common;

use std::time::Duration;

use common::{Call, RecordingReporter, ScriptedAssociation};
use dicom_dictionary_std::tags;
use dicom_query::query::{DicomQuery, ProgressEvent};
use dicom_query::storage::MemoryIngestor;
use dicom_query::{FilterSet, FilterValue};
use dimse::{QueryModel, ReleaseKind, TransferSyntax};

fn query_with(association: ScriptedAssociation, filters: &[(&str, &str)]) -> DicomQuery<ScriptedAssociation> {
    let mut query = DicomQuery::new(association);
    query.set_calling_ae_title("CTK");
    query.set_called_ae_title("PACS");
    query.set_host("pacs.local");
    query.set_port(104);
    let filters: FilterSet = filters
        .iter()
        .map(|(k, v)| (k.to_string(), FilterValue::Text(v.to_string())))
        .collect();
    query.set_filters(filters);
    query
}

fn uid_of(record: &dicom_object::InMemDicomObject, tag: dicom_core::Tag) -> String {
    record
        .element(tag)
        .map(|e| e.to_str().unwrap().to_string())
        .unwrap_or_default()
}

#[tokio::test]
async fn two_studies_cascade_into_two_series_queries() {
    let mut query = query_with(ScriptedAssociation::with_studies(&["S1", "S2"]), &[("ID", "12")]);
    let store = MemoryIngestor::new();
    let reporter = RecordingReporter::default();

    query.run_query(&store, &reporter).await;

    let association = query.association();
    let sent = association.sent();
    assert_eq!(sent.len(), 3);

    assert_eq!(sent[0].level, "STUDY");
    assert_eq!(sent[0].link, "");
    assert_eq!(sent[0].patient_id, "*12*");
    assert_eq!(sent[0].context, 1);

    assert_eq!(association.series_links(), vec!["S1", "S2"]);
    for series in &sent[1..] {
        assert_eq!(series.level, "SERIES");
        assert_eq!(series.patient_id, "*12*");
        assert_eq!(series.context, 0);
        assert_eq!(series.attribute_count, sent[0].attribute_count);
    }

    // 2 study matches + 2 series matches per study
    assert_eq!(store.len(), 6);
    assert_eq!(query.study_instance_uids_queried(), ["S1", "S2"]);
    assert_eq!(association.closes(), vec![ReleaseKind::Release]);
    assert_eq!(reporter.events().last(), Some(&ProgressEvent::Percent(100)));
}

#[tokio::test]
async fn no_studies_means_no_series_queries() {
    let mut query = query_with(ScriptedAssociation::with_studies(&[]), &[]);
    let store = MemoryIngestor::new();
    let reporter = RecordingReporter::default();

    query.run_query(&store, &reporter).await;

    let association = query.association();
    assert_eq!(association.sent().len(), 1);
    assert!(association.series_links().is_empty());
    assert!(store.is_empty());
    assert_eq!(association.closes(), vec![ReleaseKind::Release]);
    assert_eq!(reporter.percents(), vec![0, 10, 20, 30, 40, 50, 100]);
}

#[tokio::test]
async fn association_is_configured_before_initialization() {
    let mut query = query_with(ScriptedAssociation::with_studies(&[]), &[]);
    query
        .run_query(&MemoryIngestor::new(), &RecordingReporter::default())
        .await;

    let calls = &query.association().calls;
    assert_eq!(
        calls[..6],
        [
            Call::LocalTitle("CTK".into()),
            Call::PeerTitle("PACS".into()),
            Call::PeerHost("pacs.local".into()),
            Call::PeerPort(104),
            Call::AddContext(
                QueryModel::StudyRootFind,
                vec![
                    TransferSyntax::ExplicitVrLittleEndian,
                    TransferSyntax::ExplicitVrBigEndian,
                    TransferSyntax::ImplicitVrLittleEndian,
                ]
            ),
            Call::InitializeNetwork,
        ]
    );
    assert_eq!(calls[6], Call::Negotiate);
}

#[tokio::test]
async fn network_init_failure_ends_run_without_close() {
    let mut association = ScriptedAssociation::with_studies(&["S1"]);
    association.fail_init = true;
    let mut query = query_with(association, &[]);
    let store = MemoryIngestor::new();
    let reporter = RecordingReporter::default();

    query.run_query(&store, &reporter).await;

    let association = query.association();
    assert!(association.sent().is_empty());
    assert!(association.closes().is_empty());
    assert!(!association.calls.contains(&Call::Negotiate));
    assert!(store.is_empty());

    assert_eq!(reporter.percents(), vec![0, 10, 100]);
    assert_eq!(reporter.events().last(), Some(&ProgressEvent::Percent(100)));
    assert!(reporter
        .messages()
        .iter()
        .any(|m| m.starts_with("Error initializing the network")));
}

#[tokio::test]
async fn failed_negotiation_still_queries_and_closes() {
    let mut association = ScriptedAssociation::with_studies(&["S1"]);
    association.fail_negotiation = true;
    let mut query = query_with(association, &[]);
    let store = MemoryIngestor::new();
    let reporter = RecordingReporter::default();

    query.run_query(&store, &reporter).await;

    let association = query.association();
    let sent = association.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].context, 0);
    assert!(store.is_empty());
    assert_eq!(association.closes(), vec![ReleaseKind::Release]);

    let messages = reporter.messages();
    assert!(messages
        .iter()
        .any(|m| m == "Failed to find acceptable presentation context"));
    assert!(messages.iter().any(|m| m.starts_with("Find failed")));
    assert_eq!(reporter.events().last(), Some(&ProgressEvent::Percent(100)));
}

#[tokio::test]
async fn context_probe_follows_preference_order() {
    let mut association = ScriptedAssociation::with_studies(&[]);
    association.accepted = vec![TransferSyntax::ImplicitVrLittleEndian];
    let mut query = query_with(association, &[]);

    query
        .run_query(&MemoryIngestor::new(), &RecordingReporter::default())
        .await;
    assert_eq!(query.association().sent()[0].context, 5);

    let mut association = ScriptedAssociation::with_studies(&[]);
    association.accepted = vec![
        TransferSyntax::ImplicitVrLittleEndian,
        TransferSyntax::ExplicitVrBigEndian,
    ];
    let mut query = query_with(association, &[]);
    query
        .run_query(&MemoryIngestor::new(), &RecordingReporter::default())
        .await;
    assert_eq!(query.association().sent()[0].context, 3);
}

#[tokio::test]
async fn series_failure_does_not_stop_siblings() {
    let mut association = ScriptedAssociation::with_studies(&["S1", "S2", "S3"]);
    association.failing_series.insert("S2".to_string());
    let mut query = query_with(association, &[]);
    let store = MemoryIngestor::new();
    let reporter = RecordingReporter::default();

    query.run_query(&store, &reporter).await;

    let association = query.association();
    assert_eq!(association.series_links(), vec!["S1", "S2", "S3"]);
    assert_eq!(association.closes(), vec![ReleaseKind::Release]);

    // 3 studies + 2 series for S1 and S3; nothing from the failed S2 query
    assert_eq!(store.len(), 7);
    let series_studies: Vec<String> = store
        .records()
        .iter()
        .filter(|r| r.element(tags::SERIES_INSTANCE_UID).is_ok())
        .map(|r| uid_of(r, tags::STUDY_INSTANCE_UID))
        .collect();
    assert_eq!(series_studies, vec!["S1", "S1", "S3", "S3"]);

    let messages = reporter.messages();
    assert!(messages.contains(&"Find failed for study S2".to_string()));
    assert!(messages.contains(&"Find succeeded for study S3".to_string()));
    assert_eq!(reporter.events().last(), Some(&ProgressEvent::Percent(100)));
}

#[tokio::test]
async fn failed_study_query_proceeds_to_close() {
    let mut association = ScriptedAssociation::with_studies(&["S1"]);
    association.fail_study_query = true;
    let mut query = query_with(association, &[]);
    let reporter = RecordingReporter::default();

    query.run_query(&MemoryIngestor::new(), &reporter).await;

    let association = query.association();
    assert_eq!(association.sent().len(), 1);
    assert_eq!(association.closes(), vec![ReleaseKind::Release]);
    assert_eq!(reporter.percents(), vec![0, 10, 20, 30, 40, 50, 100]);
}

#[tokio::test]
async fn matches_without_study_uid_are_stored_but_not_queried() {
    let mut association = ScriptedAssociation::with_studies(&["S1", "S2"]);
    association.studies.insert(1, None);
    let mut query = query_with(association, &[]);
    let store = MemoryIngestor::new();

    query.run_query(&store, &RecordingReporter::default()).await;

    assert_eq!(query.association().series_links(), vec!["S1", "S2"]);
    assert_eq!(query.study_instance_uids_queried(), ["S1", "S2"]);
    // all 3 study matches + 2 series each
    assert_eq!(store.len(), 7);
}

#[tokio::test]
async fn duplicate_study_uids_are_queried_twice() {
    let mut query = query_with(ScriptedAssociation::with_studies(&["S1", "S1"]), &[]);
    query
        .run_query(&MemoryIngestor::new(), &RecordingReporter::default())
        .await;

    assert_eq!(query.association().series_links(), vec!["S1", "S1"]);
    assert_eq!(query.study_instance_uids_queried(), ["S1", "S1"]);
}

#[tokio::test]
async fn series_progress_is_emitted_twice_per_study() {
    let mut query = query_with(
        ScriptedAssociation::with_studies(&["S1", "S2", "S3", "S4"]),
        &[],
    );
    let reporter = RecordingReporter::default();

    query.run_query(&MemoryIngestor::new(), &reporter).await;

    assert_eq!(
        reporter.percents(),
        vec![0, 10, 20, 30, 40, 50, 50, 50, 56, 56, 62, 62, 68, 68, 100]
    );

    let series_values: Vec<u8> = reporter.percents()[6..14].to_vec();
    assert!(series_values.iter().all(|p| (50..=75).contains(p)));
    assert!(series_values.windows(2).all(|w| w[0] <= w[1]));

    let starts: Vec<String> = reporter
        .messages()
        .into_iter()
        .filter(|m| m.starts_with("Starting series C-FIND"))
        .collect();
    assert_eq!(starts.len(), 4);
    assert_eq!(starts[0], "Starting series C-FIND for study S1");
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let mut query = query_with(ScriptedAssociation::with_studies(&["S1", "S2"]), &[("Name", "abc")]);

    let first_store = MemoryIngestor::new();
    let first = RecordingReporter::default();
    query.run_query(&first_store, &first).await;
    let first_calls = query.association().calls.clone();

    let second_store = MemoryIngestor::new();
    let second = RecordingReporter::default();
    query.run_query(&second_store, &second).await;
    let second_calls = query.association().calls[first_calls.len()..].to_vec();

    assert_eq!(first.events(), second.events());
    assert_eq!(first_calls, second_calls);

    let series = |store: &MemoryIngestor| -> Vec<String> {
        store
            .records()
            .iter()
            .map(|r| uid_of(r, tags::SERIES_INSTANCE_UID))
            .collect()
    };
    assert_eq!(series(&first_store), series(&second_store));
    assert_eq!(query.study_instance_uids_queried(), ["S1", "S2"]);
}

#[tokio::test]
async fn cancelled_run_skips_series_and_closes() {
    let mut query = query_with(ScriptedAssociation::with_studies(&["S1", "S2"]), &[]);
    query.cancellation_token().cancel();
    let reporter = RecordingReporter::default();

    query.run_query(&MemoryIngestor::new(), &reporter).await;

    let association = query.association();
    assert!(association.series_links().is_empty());
    assert_eq!(association.closes(), vec![ReleaseKind::Release]);
    assert!(reporter.messages().contains(&"Query cancelled".to_string()));
    assert_eq!(reporter.events().last(), Some(&ProgressEvent::Percent(100)));
}

#[tokio::test]
async fn cancellation_ends_with_the_run_it_cancelled() {
    let mut query = query_with(ScriptedAssociation::with_studies(&["S1", "S2"]), &[]);
    let cancel = query.cancellation_token();
    cancel.cancel();

    query
        .run_query(&MemoryIngestor::new(), &RecordingReporter::default())
        .await;
    assert!(query.association().series_links().is_empty());
    assert!(!query.cancellation_token().is_cancelled());

    let reporter = RecordingReporter::default();
    query.run_query(&MemoryIngestor::new(), &reporter).await;

    assert_eq!(query.association().series_links(), vec!["S1", "S2"]);
    assert!(!reporter.messages().contains(&"Query cancelled".to_string()));
    assert_eq!(reporter.events().last(), Some(&ProgressEvent::Percent(100)));
}

#[tokio::test]
async fn dropped_run_aborts_association() {
    let mut association = ScriptedAssociation::with_studies(&["S1"]);
    association.hang_on_study_query = true;
    let mut query = query_with(association, &[]);
    let store = MemoryIngestor::new();
    let reporter = RecordingReporter::default();

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        query.run_query(&store, &reporter),
    )
    .await;
    assert!(result.is_err());

    assert_eq!(query.association().closes(), vec![ReleaseKind::Abort]);
    assert!(!reporter.percents().contains(&100));
}
