#![cfg(feature = "artifact")]

use endpoint_bdd::{
    get_attr, is_set, is_valid_host_label, parse_url, reference, string_equals, Artifact,
    CompileOptions, Condition, Context, DeserializeError, Endpoint, EndpointBddError, Parameter,
    Rule, RuleSetBuilder,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn simple_artifact() -> Artifact {
    RuleSetBuilder::new()
        .parameter(Parameter::string("Region"))
        .rule(
            Rule::endpoint(Endpoint::new("https://{Region}.example.com"))
                .when(is_set(reference("Region"))),
        )
        .rule(Rule::error("Region must be set"))
        .build()
        .unwrap()
        .compile(&[], &CompileOptions::default())
        .unwrap()
        .artifact()
}

fn complex_artifact() -> Artifact {
    RuleSetBuilder::new()
        .parameter(Parameter::string("Region").required().with_default("us-east-1"))
        .parameter(Parameter::string("Bucket").documented("bucket name"))
        .parameter(Parameter::string("Endpoint"))
        .parameter(Parameter::boolean("UseFIPS").with_default(false))
        .parameter(Parameter::string_array("Tags"))
        .rule(
            Rule::endpoint(
                Endpoint::new("{url#scheme}://{Bucket}.{url#authority}{url#normalizedPath}")
                    .header("x-bucket", "{Bucket}")
                    .property("signing", "s3"),
            )
            .when(Condition::new(parse_url(reference("Endpoint"))).assign("url"))
            .when(string_equals(get_attr(reference("url"), "scheme"), "https"))
            .when(is_valid_host_label(reference("Bucket"), false)),
        )
        .rule(Rule::tree([
            Rule::endpoint(Endpoint::new("https://{Bucket}.s3-fips.{Region}.amazonaws.com"))
                .when(is_set(reference("Bucket")))
                .when(reference("UseFIPS")),
            Rule::endpoint(Endpoint::new("https://{Bucket}.s3.{Region}.amazonaws.com"))
                .when(is_set(reference("Bucket"))),
        ]))
        .rule(Rule::error("Bucket must be set"))
        .build()
        .unwrap()
        .compile(&[], &CompileOptions::default())
        .unwrap()
        .artifact()
}

fn contexts() -> Vec<Context> {
    vec![
        Context::new(),
        Context::new().set("Bucket", "photos"),
        Context::new().set("Bucket", "photos").set("UseFIPS", true),
        Context::new()
            .set("Bucket", "photos")
            .set("Endpoint", "https://example.com:8443/api"),
        Context::new()
            .set("Bucket", "Bad_Bucket")
            .set("Endpoint", "https://example.com"),
        Context::new()
            .set("Bucket", "photos")
            .set("Endpoint", "http://example.com"),
    ]
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[test]
fn round_trip_simple() {
    let original = simple_artifact();
    let restored = Artifact::from_bytes(&original.to_bytes().unwrap()).unwrap();
    assert_eq!(original, restored);
    let ctx = Context::new().set("Region", "us-west-2");
    assert_eq!(original.evaluate(&ctx), restored.evaluate(&ctx));
}

#[test]
fn round_trip_complex() {
    let original = complex_artifact();
    let restored = Artifact::from_bytes(&original.to_bytes().unwrap()).unwrap();
    assert_eq!(original, restored);
    assert_eq!(restored.parameters().len(), 5);
    assert_eq!(restored.parameters()[1].documentation(), Some("bucket name"));
    for ctx in contexts() {
        assert_eq!(original.evaluate(&ctx), restored.evaluate(&ctx));
    }
}

#[test]
fn encoding_determinism() {
    let a = complex_artifact().to_bytes().unwrap();
    let b = complex_artifact().to_bytes().unwrap();
    assert_eq!(a, b);
}

#[test]
fn file_round_trip() {
    let dir = std::env::temp_dir().join("endpoint_bdd_test_artifact");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("rules.ebdd");

    let original = complex_artifact();
    original.write_file(&path).unwrap();
    let restored = Artifact::read_file(&path).unwrap();
    assert_eq!(original, restored);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = Artifact::read_file("/nonexistent/endpoint-bdd/rules.ebdd").unwrap_err();
    assert!(matches!(err, DeserializeError::Io(_)), "got: {err}");
    let err: EndpointBddError = err.into();
    assert!(matches!(err, EndpointBddError::Deserialize(_)));
}

// ---------------------------------------------------------------------------
// Corruption
// ---------------------------------------------------------------------------

#[test]
fn corruption_byte_flip() {
    let mut corrupted = simple_artifact().to_bytes().unwrap();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;

    let err = Artifact::from_bytes(&corrupted).unwrap_err();
    assert!(
        matches!(err, DeserializeError::ChecksumMismatch),
        "expected ChecksumMismatch, got: {err}"
    );
}

#[test]
fn corruption_truncation() {
    let bytes = simple_artifact().to_bytes().unwrap();
    let err = Artifact::from_bytes(&bytes[..33]).unwrap_err();
    assert!(
        matches!(err, DeserializeError::LengthMismatch { .. }),
        "expected LengthMismatch, got: {err}"
    );
}

#[test]
fn bad_magic() {
    let mut bad = simple_artifact().to_bytes().unwrap();
    bad[0..4].copy_from_slice(b"OORO");
    let err = Artifact::from_bytes(&bad).unwrap_err();
    assert!(
        matches!(err, DeserializeError::BadMagic),
        "expected BadMagic, got: {err}"
    );
    assert_eq!(
        err.to_string(),
        "not an endpoint-bdd artifact: invalid magic bytes"
    );
}

#[test]
fn version_mismatch() {
    let mut bad = simple_artifact().to_bytes().unwrap();
    bad[4] = 99;
    bad[5] = 0;
    let err = Artifact::from_bytes(&bad).unwrap_err();
    assert!(
        matches!(
            err,
            DeserializeError::IncompatibleVersion {
                blob: 99,
                supported: 1
            }
        ),
        "expected IncompatibleVersion, got: {err}"
    );
}

#[test]
fn empty_input_rejected() {
    assert!(matches!(
        Artifact::from_bytes(&[]),
        Err(DeserializeError::LengthMismatch { .. })
    ));
}
