//! End-to-end conversions of small models built with the record fixtures.

use gat_cgmes::fixtures::ModelBuilder;
use gat_cgmes::{CgmesModel, Conversion, ConversionConfig, ConversionError, ConversionResult};
use gat_core::{
    EquipmentData, Identifiable, IssueKind, Kilovolts, Megavars, Network, PhaseRegulationMode,
    TerminalIdx,
};
use tracing_subscriber::EnvFilter;

fn convert(model: &CgmesModel) -> anyhow::Result<ConversionResult> {
    Ok(Conversion::new(model, &ConversionConfig::default()).convert()?)
}

fn data<'n>(network: &'n Network, id: &str) -> &'n EquipmentData {
    let idx = network.find_equipment(id).expect("equipment converted");
    &network.equipment(idx).expect("equipment present").data
}

fn terminal_of(network: &Network, id: &str) -> TerminalIdx {
    let idx = network.find_equipment(id).expect("equipment converted");
    network.equipment(idx).and_then(|e| e.terminal(1)).expect("side 1")
}

#[test]
fn test_zero_voltage_target_uses_nominal_voltage() -> anyhow::Result<()> {
    let mut b = ModelBuilder::node_breaker();
    b.substation("S");
    b.voltage_level("VL", "S", 225.0);
    b.node("CN1", "VL").node("CN2", "VL");
    b.busbar("BBS", "CN1");
    b.switch("BRK", "CN1", "CN2", false);
    b.generator("G", "CN2", Some("RC"));
    b.regulating_control("RC", "voltage", "BRK_T1", 0.0, true);
    let model = b.build();
    let result = convert(&model)?;

    let EquipmentData::Generator(g) = data(&result.network, "G") else {
        anyhow::bail!("G is not a generator");
    };
    assert_eq!(g.target_v, Some(Kilovolts(225.0)));
    assert!(g.voltage_regulator_on);
    // the breaker end resolves to the busbar behind it
    assert_eq!(g.regulating_terminal, Some(terminal_of(&result.network, "BBS")));
    let fixed: Vec<_> = result.diagnostics.about("Generator G").collect();
    assert_eq!(fixed.len(), 1);
    assert_eq!(fixed[0].kind, IssueKind::Fixed);
    assert_eq!(fixed[0].after.as_deref(), Some("225"));
    Ok(())
}

#[test]
fn test_reactive_power_control_between_busbars_ignored() -> anyhow::Result<()> {
    let mut b = ModelBuilder::node_breaker();
    b.substation("S");
    b.voltage_level("VL1", "S", 400.0).voltage_level("VL2", "S", 400.0);
    b.node("CN1", "VL1").node("CN2", "VL1").node("CN3", "VL2");
    b.busbar("BBS1", "CN1").busbar("BBS2", "CN2");
    b.switch("COUPLER", "CN1", "CN2", false);
    b.generator("G", "CN3", Some("RC"));
    b.regulating_control("RC", "reactivePower", "COUPLER_T1", 50.0, true);
    let model = b.build();
    let result = convert(&model)?;

    let EquipmentData::Generator(g) = data(&result.network, "G") else {
        anyhow::bail!("G is not a generator");
    };
    assert!(g.remote_reactive_power_control.is_none());
    assert_eq!(g.target_q, Megavars(10.0));
    let issues: Vec<_> = result.diagnostics.about("Generator G").collect();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::Ignored);
    // never resolved, so reported once as pending
    assert_eq!(result.diagnostics.about("Regulating control RC").count(), 1);
    Ok(())
}

#[test]
fn test_substations_merged_across_transformers() -> anyhow::Result<()> {
    let mut b = ModelBuilder::node_breaker();
    b.substation("B").substation("C").substation("A").substation("D");
    b.voltage_level("VA", "A", 400.0)
        .voltage_level("VB", "B", 220.0)
        .voltage_level("VC", "C", 220.0)
        .voltage_level("VD", "D", 400.0);
    b.node("CNA", "VA").node("CNB", "VB").node("CNC", "VC").node("CND", "VD");
    b.transformer("T_AB", &["CNA", "CNB"]);
    b.transformer("T_BC", &["CNB", "CNC"]);
    let model = b.build();
    let result = convert(&model)?;
    let network = &result.network;

    let a = network.find_substation("A").expect("representative kept");
    assert!(network.find_substation("B").is_none());
    assert!(network.find_substation("C").is_none());
    assert!(network.find_substation("D").is_some());
    let mut aliases = network.substation(a).map(|s| s.aliases.clone()).unwrap_or_default();
    aliases.sort();
    assert_eq!(aliases, vec!["B".to_string(), "C".to_string()]);
    for vl in ["VA", "VB", "VC"] {
        let idx = network.find_voltage_level(vl).expect("voltage level converted");
        assert_eq!(network.voltage_level(idx).and_then(|v| v.substation), Some(a));
    }
    Ok(())
}

#[test]
fn test_phase_tap_changer_keeps_regulation() -> anyhow::Result<()> {
    let mut b = ModelBuilder::node_breaker();
    b.substation("S");
    b.voltage_level("VL1", "S", 400.0).voltage_level("VL2", "S", 220.0);
    b.node("CN1", "VL1").node("CN2", "VL2").node("CN3", "VL2");
    b.transformer("PT", &["CN1", "CN2"]);
    b.line("L", "CN2", "CN3");
    b.ratio_tap_changer("RTC", "PT_E1", Some("RC_V"));
    b.phase_tap_changer("PTC", "PT_E1", Some("RC_P"));
    b.regulating_control("RC_V", "voltage", "PT_T2", 221.0, true);
    b.regulating_control("RC_P", "activePower", "L_T1", -80.0, true);
    let model = b.build();
    let result = convert(&model)?;

    let EquipmentData::TwoWindingsTransformer(t) = data(&result.network, "PT") else {
        anyhow::bail!("PT is not a two-winding transformer");
    };
    let ratio = t.ratio_tap_changer.as_ref().expect("ratio tap changer");
    let phase = t.phase_tap_changer.as_ref().expect("phase tap changer");
    assert!(!ratio.regulating);
    assert!(phase.regulating);
    assert_eq!(phase.regulation_mode, PhaseRegulationMode::ActivePowerControl);
    assert_eq!(phase.regulation_value, Some(-80.0));
    Ok(())
}

#[test]
fn test_disconnected_terminal_gets_one_fictitious_switch() -> anyhow::Result<()> {
    let mut b = ModelBuilder::node_breaker();
    b.substation("S");
    b.voltage_level("VL", "S", 63.0);
    b.node("CN", "VL");
    b.busbar("BBS", "CN");
    b.load("LD", "CN", 12.0, 3.0);
    b.disconnect("LD_T1");
    let model = b.build();
    let result = convert(&model)?;
    let network = &result.network;

    let stats = network.stats();
    assert_eq!(stats.num_fictitious_switches, 1);
    let sw = network.find_switch("LD_T1_FICT_SW").expect("fictitious switch");
    assert!(network.is_switch_open(sw));
    let switch = network.switch(sw).expect("switch present");
    assert!(switch.fictitious);
    Ok(())
}

#[test]
fn test_boundary_tie_line_and_tie_flow() -> anyhow::Result<()> {
    let mut b = ModelBuilder::node_breaker();
    b.substation_in_region("SA", "NORTH");
    b.substation_in_region("SB", "SOUTH");
    b.voltage_level("VLA", "SA", 400.0).voltage_level("VLB", "SB", 400.0);
    b.node("CNA", "VLA").node("CNB", "VLB");
    b.boundary_node("XN", "XKEY");
    b.line("LA", "CNA", "XN");
    b.line("LB", "CNB", "XN");
    b.equivalent_injection("EI", "XN", 30.0, 0.0);
    b.control_area("CA", 120.0);
    b.tie_flow("CA", "LA_T2");
    let model = b.build();
    let result = convert(&model)?;
    let network = &result.network;

    let Some(Identifiable::TieLine(i)) = network.lookup("LA + LB") else {
        anyhow::bail!("tie line not created");
    };
    let tie = &network.tie_lines()[i];
    assert_eq!(Some(tie.dangling_line1), network.find_equipment("LA"));
    assert_eq!(
        network.control_areas()[0].tie_flows,
        vec![terminal_of(network, "LA")]
    );
    // the boundary injection is carried by the dangling lines, not converted itself
    assert!(network.find_equipment("EI").is_none());
    Ok(())
}

#[test]
fn test_missing_equipment_core_is_fatal() {
    let model = ModelBuilder::node_breaker().build();
    let err = Conversion::new(&model, &ConversionConfig::default())
        .convert()
        .unwrap_err();
    assert!(matches!(err, ConversionError::MissingEquipmentCore(_)));
}

#[test]
fn test_json_model_converts_like_built_model() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let mut b = ModelBuilder::bus_breaker();
    b.substation("S");
    b.voltage_level("VL", "S", 110.0);
    b.node("TN1", "VL").node("TN2", "VL");
    b.switch("BRK", "TN1", "TN2", false);
    b.load("LD", "TN2", 5.0, 1.0);
    b.shunt("SH", "TN1", Some("RC"));
    b.regulating_control("RC", "voltage", "LD_T1", 112.0, true);

    let json = serde_json::to_string(b.records())?;
    let from_json = convert(&CgmesModel::from_json_str(&json)?)?;
    let built = convert(&b.build())?;

    assert_eq!(from_json.network.stats().num_switches, built.network.stats().num_switches);
    let EquipmentData::ShuntCompensator(sh) = data(&from_json.network, "SH") else {
        anyhow::bail!("SH is not a shunt compensator");
    };
    assert_eq!(sh.target_v, Some(Kilovolts(112.0)));
    assert_eq!(sh.regulating_terminal, Some(terminal_of(&from_json.network, "LD")));
    assert_eq!(from_json.diagnostics.count(IssueKind::Pending), 0);
    Ok(())
}
