use std::sync::Arc;
use std::thread;

use endpoint_bdd::{
    boolean_equals, compile_all, is_set, lit, reference, string_equals, Artifact, Compilation,
    CompileOptions, Context, Endpoint, Parameter, Resolution, ResolvedEndpoint, Rule, RuleSet,
    RuleSetBuilder, TestCase,
};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn compiled_structures_are_shareable() {
    assert_send_sync::<RuleSet>();
    assert_send_sync::<Compilation>();
    assert_send_sync::<Artifact>();
}

fn endpoint(url: String) -> Endpoint {
    Endpoint::new(lit(url))
}

fn service(name: &str) -> (RuleSet, Vec<TestCase>) {
    let ruleset = RuleSetBuilder::new()
        .parameter(Parameter::string("Region").required().with_default("us-east-1"))
        .parameter(Parameter::boolean("UseFIPS").with_default(false))
        .rule(
            Rule::endpoint(endpoint(format!("https://{name}-fips.{{Region}}.example.com")))
                .when(boolean_equals(reference("UseFIPS"), true)),
        )
        .rule(
            Rule::endpoint(endpoint(format!("https://{name}.example.com")))
                .when(string_equals(reference("Region"), "aws-global")),
        )
        .rule(
            Rule::endpoint(endpoint(format!("https://{name}.{{Region}}.example.com")))
                .when(is_set(reference("Region"))),
        )
        .build()
        .unwrap();
    let tests = vec![
        TestCase::new("default region").expect_endpoint(ResolvedEndpoint::new(format!(
            "https://{name}.us-east-1.example.com"
        ))),
        TestCase::new("fips")
            .param("Region", "eu-west-1")
            .param("UseFIPS", true)
            .expect_endpoint(ResolvedEndpoint::new(format!(
                "https://{name}-fips.eu-west-1.example.com"
            ))),
    ];
    (ruleset, tests)
}

#[test]
fn compile_all_returns_results_in_input_order() {
    let names = ["s3", "ec2", "sqs", "sns", "iam"];
    let units: Vec<_> = names.iter().map(|name| service(name)).collect();
    let results = compile_all(&units, &CompileOptions::default());
    assert_eq!(results.len(), names.len());

    let ctx = Context::new().set("Region", "aws-global");
    for (name, result) in names.iter().zip(&results) {
        let compiled = result.as_ref().unwrap();
        assert_eq!(
            compiled.evaluate(&ctx).unwrap(),
            Resolution::Endpoint(ResolvedEndpoint::new(format!("https://{name}.example.com")))
        );
    }
}

#[test]
fn compile_all_matches_sequential_compilation() {
    let units: Vec<_> = ["a", "b", "c"].iter().map(|name| service(name)).collect();
    let parallel = compile_all(&units, &CompileOptions::default());
    for ((ruleset, tests), result) in units.iter().zip(parallel) {
        let sequential = ruleset.compile(tests, &CompileOptions::default()).unwrap();
        assert_eq!(result.unwrap().bdd(), sequential.bdd());
    }
}

#[test]
fn compile_all_reports_failures_per_unit() {
    let mut units = vec![service("ok")];
    let (ruleset, _) = service("bad");
    units.push((ruleset, vec![TestCase::new("t").param("Bucket", "b")]));
    let results = compile_all(&units, &CompileOptions::default());
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
}

#[test]
fn evaluate_across_threads() {
    let (ruleset, tests) = service("s3");
    let compiled = Arc::new(ruleset.compile(&tests, &CompileOptions::default()).unwrap());

    let contexts = vec![
        Context::new(),
        Context::new().set("UseFIPS", true),
        Context::new().set("Region", "aws-global"),
        Context::new().set("Region", "ap-south-1"),
    ];
    let handles: Vec<_> = contexts
        .into_iter()
        .map(|ctx| {
            let compiled = Arc::clone(&compiled);
            thread::spawn(move || compiled.evaluate(&ctx).unwrap())
        })
        .collect();
    let urls: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().endpoint().unwrap().url().to_owned())
        .collect();

    assert_eq!(
        urls,
        [
            "https://s3.us-east-1.example.com",
            "https://s3-fips.us-east-1.example.com",
            "https://s3.example.com",
            "https://s3.ap-south-1.example.com",
        ]
    );
}
