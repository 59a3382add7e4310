use endpoint_bdd::{
    boolean_equals, is_set, is_valid_host_label, reference, string_equals, Bdd, CompileOptions,
    Condition, Context, CostConfig, CostModel, Endpoint, Function, NodeRef, Parameter,
    Resolution, ResolvedEndpoint, Rule, RuleSetBuilder, Stage, TestCase,
};
use test_log::test;

// ---------------------------------------------------------------------------
// Scenario A: global endpoint, regional endpoint, error fallback
// ---------------------------------------------------------------------------

#[test]
fn regional_endpoints() {
    let ruleset = RuleSetBuilder::new()
        .parameter(Parameter::string("Region"))
        .rule(
            Rule::endpoint(Endpoint::new("https://global.example.com"))
                .when(string_equals(reference("Region"), "aws-global")),
        )
        .rule(
            Rule::endpoint(Endpoint::new("https://{Region}.example.com"))
                .when(is_set(reference("Region"))),
        )
        .rule(Rule::error("Region must be set"))
        .build()
        .unwrap();
    let tests = vec![
        TestCase::new("global")
            .param("Region", "aws-global")
            .expect_endpoint(ResolvedEndpoint::new("https://global.example.com")),
        TestCase::new("regional")
            .param("Region", "us-east-1")
            .expect_endpoint(ResolvedEndpoint::new("https://us-east-1.example.com")),
        TestCase::new("unset").expect_error("Region must be set"),
    ];

    let compiled = ruleset
        .compile(&tests, &CompileOptions::default().strict(true))
        .unwrap();
    let bdd = compiled.bdd();
    assert_eq!(bdd.node_count(), 2);
    assert_eq!(bdd.referenced_results(), [1, 2, 3]);
    assert!(compiled.report().warnings.is_empty());
    for test in &tests {
        assert_eq!(&compiled.evaluate(test.params()).unwrap(), test.expected());
    }
}

// ---------------------------------------------------------------------------
// Scenario B: a condition reached from two branches is tested by one node
// ---------------------------------------------------------------------------

#[test]
fn shared_condition_has_one_node() {
    let shared = || Condition::new(is_set(reference("Bucket")));
    let ruleset = RuleSetBuilder::new()
        .parameter(Parameter::string("Region"))
        .parameter(Parameter::string("Bucket"))
        .parameter(Parameter::boolean("UseFIPS").with_default(false))
        .rule(
            Rule::tree([
                Rule::endpoint(Endpoint::new("https://fips.example.com"))
                    .when(boolean_equals(reference("UseFIPS"), true)),
                Rule::endpoint(Endpoint::new("https://{Bucket}.example.com")).when(shared()),
                Rule::error("Bucket must be set"),
            ])
            .when(is_set(reference("Region"))),
        )
        .rule(Rule::endpoint(Endpoint::new("https://{Bucket}.example.com")).when(shared()))
        .rule(Rule::error("Bucket must be set"))
        .build()
        .unwrap();

    let cfg = ruleset.cfg().unwrap();
    let raw = Bdd::build(&cfg, &cfg.default_order()).unwrap();
    assert_eq!(raw.node_count(), 3);
    assert_eq!(raw.nodes_testing(&shared()), 1);

    let compiled = ruleset.compile(&[], &CompileOptions::default()).unwrap();
    assert_eq!(compiled.bdd().node_count(), 3);
    assert_eq!(compiled.bdd().nodes_testing(&shared()), 1);

    let ctx = Context::new().set("Bucket", "b");
    assert_eq!(
        compiled.evaluate(&ctx).unwrap(),
        Resolution::Endpoint(ResolvedEndpoint::new("https://b.example.com"))
    );
}

// ---------------------------------------------------------------------------
// Scenario C: an expensive independent condition moves after a cheap one
// ---------------------------------------------------------------------------

#[test]
fn expensive_condition_is_tested_last() {
    let expensive = is_valid_host_label(reference("Bucket"), false);
    let cheap = boolean_equals(reference("UseFIPS"), true);
    let ruleset = RuleSetBuilder::new()
        .parameter(Parameter::string("Bucket"))
        .parameter(Parameter::boolean("UseFIPS").with_default(false))
        .rule(
            Rule::endpoint(Endpoint::new("https://{Bucket}.fips.example.com"))
                .when(expensive.clone())
                .when(cheap.clone()),
        )
        .rule(Rule::error("unsupported"))
        .build()
        .unwrap();
    let model = CostModel::default()
        .with_weight(Function::IsValidHostLabel, 100.0)
        .with_weight(Function::BooleanEquals, 10.0);
    let options = CompileOptions::default()
        .with_cost(Some(CostConfig::default().with_model(model.clone())));

    let cfg = ruleset.cfg().unwrap();
    let raw = Bdd::build(&cfg, &cfg.default_order()).unwrap();
    assert_eq!(raw.conditions()[0].expr(), &expensive);

    let compiled = ruleset.compile(&[], &options).unwrap();
    let bdd = compiled.bdd();
    assert_eq!(compiled.report().final_stage, Stage::Cost);
    assert_eq!(bdd.conditions()[0].expr(), &cheap);
    assert_eq!(bdd.conditions()[1].expr(), &expensive);
    let NodeRef::Node(root) = bdd.root() else {
        panic!("expected a decision at the root");
    };
    assert_eq!(bdd.nodes()[root as usize].condition, 0);

    let cost = compiled.report().cost.as_ref().unwrap();
    assert!(cost.final_nodes <= cost.node_limit);
    // 100 + 10/2 before, 10 + 100/2 after.
    assert!((bdd.expected_cost(&model) - 60.0).abs() < 1e-9);
    assert!((raw.expected_cost(&model) - 105.0).abs() < 1e-9);
}
