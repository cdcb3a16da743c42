use std::path::{Path, PathBuf};
use std::process::Command;

use lexalign::serializer::{read_file, OWL_EQUIVALENT_CLASS};
use lexalign::{AlignConfig, AlignmentBatch, AlignmentFormat, AlignmentTask, DataError, RunStatus};

const MOUSE_TTL: &str = r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix ma: <http://mouse.owl#> .

ma:MA_0000072 a owl:Class ; rdfs:label "heart" .
ma:MA_0000415 a owl:Class ; rdfs:label "lung" .
ma:MA_0000074 a owl:Class ; rdfs:label "left ventricle" .
ma:MA_0000002 a owl:Class ; rdfs:label "tail" .
ma:MA_0000001 a owl:Class .
"#;

const HUMAN_NT: &str = r#"
<http://human.owl#NCI_C12727> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/2002/07/owl#Class> .
<http://human.owl#NCI_C12727> <http://www.w3.org/2000/01/rdf-schema#label> "Heart" .
<http://human.owl#NCI_C12468> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/2002/07/owl#Class> .
<http://human.owl#NCI_C12468> <http://www.w3.org/2000/01/rdf-schema#label> "Lung" .
<http://human.owl#NCI_C12870> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/2002/07/owl#Class> .
<http://human.owl#NCI_C12870> <http://www.w3.org/2000/01/rdf-schema#label> "Left_Ventricle" .
<http://human.owl#NCI_C12415> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/2002/07/owl#Class> .
<http://human.owl#NCI_C12415> <http://www.w3.org/2000/01/rdf-schema#label> "Kidney" .
"#;

const REFERENCE_TTL: &str = r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
<http://mouse.owl#MA_0000072> owl:equivalentClass <http://human.owl#NCI_C12727> .
<http://mouse.owl#MA_0000415> owl:equivalentClass <http://human.owl#NCI_C12468> .
<http://mouse.owl#MA_0000002> owl:equivalentClass <http://human.owl#NCI_C12415> .
"#;

const HUMAN_OWL: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:rdfs="http://www.w3.org/2000/01/rdf-schema#"
         xmlns:owl="http://www.w3.org/2002/07/owl#">
  <owl:Class rdf:about="http://human.owl#NCI_C12727">
    <rdfs:label rdf:datatype="http://www.w3.org/2001/XMLSchema#string">Heart</rdfs:label>
  </owl:Class>
  <owl:Class rdf:about="http://human.owl#NCI_C12468">
    <rdfs:label>Lung</rdfs:label>
  </owl:Class>
  <owl:Class rdf:about="http://human.owl#NCI_C12870">
    <rdfs:label>Left_Ventricle</rdfs:label>
  </owl:Class>
  <owl:Class rdf:about="http://human.owl#NCI_C12415">
    <rdfs:label>Kidney</rdfs:label>
  </owl:Class>
</rdf:RDF>
"#;

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mouse.ttl"), MOUSE_TTL).unwrap();
        std::fs::write(dir.path().join("human.nt"), HUMAN_NT).unwrap();
        std::fs::write(dir.path().join("reference.ttl"), REFERENCE_TTL).unwrap();
        std::fs::write(dir.path().join("human.owl"), HUMAN_OWL).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[test]
fn aligns_persists_and_evaluates() {
    let fx = Fixture::new();
    let output = fx.path("alignment.ttl");

    let outcome = AlignmentTask::new(fx.path("mouse.ttl"), fx.path("human.nt"))
        .with_config(AlignConfig::default().with_parallelism(3))
        .with_output(&output, AlignmentFormat::Turtle)
        .with_reference(fx.path("reference.ttl"))
        .run()
        .unwrap();

    let report = &outcome.report;
    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(outcome.source_entities, 5);
    assert_eq!(outcome.target_entities, 4);
    assert_eq!(report.pairs_total, 20);
    assert_eq!(report.skipped_pairs, 0);

    let pairs: Vec<(&str, &str)> = report.matches.pairs().collect();
    assert_eq!(
        pairs,
        vec![
            ("http://mouse.owl#MA_0000072", "http://human.owl#NCI_C12727"),
            ("http://mouse.owl#MA_0000074", "http://human.owl#NCI_C12870"),
            ("http://mouse.owl#MA_0000415", "http://human.owl#NCI_C12468"),
        ]
    );
    for (_, _, score) in report.matches.iter() {
        assert_eq!(score, 1.0);
    }

    let evaluation = outcome.evaluation.expect("reference was given");
    assert_eq!(evaluation.true_positives, 2);
    assert_eq!(evaluation.false_positives, 1);
    assert_eq!(evaluation.false_negatives, 1);
    assert!((evaluation.f_score - 2.0 / 3.0).abs() < 1e-12);

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(written.matches(OWL_EQUIVALENT_CLASS).count(), 3);
    let reloaded = read_file(&output, AlignmentFormat::Turtle).unwrap();
    assert!(reloaded.is_subset_of(&report.matches) && report.matches.is_subset_of(&reloaded));
}

#[test]
fn json_output_keeps_scores() {
    let fx = Fixture::new();
    let output = fx.path("alignment.json");
    let outcome = AlignmentTask::new(fx.path("mouse.ttl"), fx.path("human.nt"))
        .with_output(&output, AlignmentFormat::Json)
        .run()
        .unwrap();
    let reloaded = read_file(&output, AlignmentFormat::Json).unwrap();
    assert_eq!(reloaded, outcome.report.matches);
}

#[test]
fn empty_graph_gives_empty_alignment() {
    let fx = Fixture::new();
    std::fs::write(fx.path("empty.json"), "[]").unwrap();
    let outcome = AlignmentTask::new(fx.path("mouse.ttl"), fx.path("empty.json"))
        .run()
        .unwrap();
    assert_eq!(outcome.report.status, RunStatus::Done);
    assert!(outcome.report.matches.is_empty());
}

#[test]
fn unsupported_graph_format_is_a_load_error() {
    let fx = Fixture::new();
    std::fs::write(fx.path("mouse.csv"), "MA_0000072,heart").unwrap();
    let err = AlignmentTask::new(fx.path("mouse.csv"), fx.path("human.nt"))
        .run()
        .unwrap_err();
    assert!(err.is_load());
}

#[test]
fn rdf_xml_graph_gives_the_same_alignment_as_ntriples() {
    let fx = Fixture::new();
    let from_nt = AlignmentTask::new(fx.path("mouse.ttl"), fx.path("human.nt"))
        .run()
        .unwrap();
    let from_owl = AlignmentTask::new(fx.path("mouse.ttl"), fx.path("human.owl"))
        .with_reference(fx.path("reference.ttl"))
        .run()
        .unwrap();
    assert_eq!(from_owl.target_entities, 4);
    assert_eq!(from_owl.report.matches, from_nt.report.matches);
    let evaluation = from_owl.evaluation.unwrap();
    assert_eq!(evaluation.true_positives, 2);
}

#[test]
fn null_label_skips_pairs_without_failing_the_run() {
    let fx = Fixture::new();
    std::fs::write(
        fx.path("mouse.json"),
        r#"[{"iri":"http://a#Good","labels":["heart"]},{"iri":"http://a#Bad","labels":["heart",null]}]"#,
    )
    .unwrap();
    let outcome = AlignmentTask::new(fx.path("mouse.json"), fx.path("human.nt"))
        .run()
        .unwrap();
    let report = &outcome.report;
    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(report.skipped_pairs, 4);
    assert!(report.matches.contains_pair("http://a#Good", "http://human.owl#NCI_C12727"));
    assert!(report.matches.pairs().all(|(source, _)| source != "http://a#Bad"));
    assert!(matches!(
        &report.data_errors[0],
        DataError::NonStringLabel { iri, found } if iri == "http://a#Bad" && found == "null"
    ));
}

#[test]
fn iri_label_in_turtle_is_skipped_and_counted() {
    let fx = Fixture::new();
    std::fs::write(
        fx.path("odd.ttl"),
        r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
<http://a#Odd> a owl:Class ; rdfs:label <http://not/a/string> .
"#,
    )
    .unwrap();
    std::fs::write(
        fx.path("heart.json"),
        r#"[{"iri": "http://b#Heart", "labels": ["heart"]}]"#,
    )
    .unwrap();
    let outcome = AlignmentTask::new(fx.path("odd.ttl"), fx.path("heart.json"))
        .run()
        .unwrap();
    assert!(outcome.report.matches.is_empty());
    assert_eq!(outcome.report.skipped_pairs, 1);
    assert_eq!(outcome.report.data_errors.len(), 1);
}

#[test]
fn batch_file_aligns_each_pair() {
    let fx = Fixture::new();
    std::fs::write(
        fx.path("pairs.json"),
        r#"[
            {"source": "mouse.ttl", "target": "human.nt", "output": "mouse-human.ttl", "reference": "reference.ttl"},
            {"source": "mouse.ttl", "target": "human.owl", "output": "mouse-human.json"}
        ]"#,
    )
    .unwrap();
    let outcomes = AlignmentBatch::from_json_file(&fx.path("pairs.json"))
        .unwrap()
        .with_config(AlignConfig::default().with_parallelism(2))
        .run()
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].evaluation.is_some());
    assert!(outcomes[1].evaluation.is_none());

    let turtle = read_file(&fx.path("mouse-human.ttl"), AlignmentFormat::Turtle).unwrap();
    let json = read_file(&fx.path("mouse-human.json"), AlignmentFormat::Json).unwrap();
    assert_eq!(turtle.len(), 3);
    assert_eq!(json, outcomes[1].report.matches);
}

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lexalign"))
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn cli_prints_evaluation() {
    let fx = Fixture::new();
    let out = cli()
        .args(["--source", arg(&fx.path("mouse.ttl"))])
        .args(["--target", arg(&fx.path("human.nt"))])
        .args(["--reference", arg(&fx.path("reference.ttl"))])
        .args(["--threads", "2"])
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("matches:    3"), "{stdout}");
    assert!(stdout.contains("f-score:    0.667"), "{stdout}");
}

#[test]
fn cli_compare_sequential_reports_agreement() {
    let fx = Fixture::new();
    let out = cli()
        .args(["--source", arg(&fx.path("mouse.ttl"))])
        .args(["--target", arg(&fx.path("human.owl"))])
        .args(["--reference", arg(&fx.path("reference.ttl"))])
        .args(["--threads", "3", "--compare-sequential"])
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("agree:      true"), "{stdout}");
    assert!(stdout.contains("f-score:    0.667"), "{stdout}");
}

#[test]
fn cli_runs_a_batch_file() {
    let fx = Fixture::new();
    std::fs::write(
        fx.path("pairs.json"),
        r#"[{"source": "mouse.ttl", "target": "human.nt"}, {"source": "mouse.ttl", "target": "human.owl"}]"#,
    )
    .unwrap();
    let out = cli()
        .args(["--pairs", arg(&fx.path("pairs.json"))])
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("pair:       2"), "{stdout}");
    assert_eq!(stdout.matches("matches:    3").count(), 2, "{stdout}");
}

#[test]
fn cli_usage_errors_exit_with_two() {
    let out = cli().args(["--source", "a.ttl"]).output().unwrap();
    assert_eq!(out.status.code(), Some(2));

    let fx = Fixture::new();
    let out = cli()
        .args(["--source", arg(&fx.path("mouse.ttl"))])
        .args(["--target", arg(&fx.path("human.nt"))])
        .args(["--threshold", "1.5"])
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));

    let out = cli()
        .args(["--pairs", "pairs.json", "--source", "a.ttl"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn cli_run_errors_exit_with_one() {
    let out = cli()
        .args(["--source", "/nonexistent/a.ttl", "--target", "/nonexistent/b.ttl"])
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
}
