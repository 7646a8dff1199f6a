//! Power transformers with their tap changers.
//!
//! A transformer is the group of its ends. Two ends give a two-winding
//! transformer whose parameters are referred to side 2 and whose tap changers
//! sit on side 1; three ends give a
//! three-winding transformer with one leg per end, around a star bus at the
//! rated voltage of end 1.

use gat_core::{
    Degrees, EquipmentData, Kilovolts, MegavoltAmperes, Ohms, PhaseRegulationMode,
    PhaseTapChanger, RatioTapChanger, Siemens, ThreeWindingsTransformer, TwoWindingsTransformer,
    Winding,
};
use tracing::debug;

use super::deferral_node;
use crate::boundary::BoundaryEquipment;
use crate::context::Context;
use crate::error::Result;
use crate::model::TapChangersByEnd;
use crate::names;
use crate::records::PropertyBag;
use crate::regulating::{ControlMode, PendingControl, TapChangerControl, TapChangerKind};

pub fn convert_transformers(ctx: &mut Context) -> Result<()> {
    let model = ctx.model;
    let tap_changers = model.tap_changers_by_end();
    for (id, ends) in model.grouped_transformer_ends() {
        let terminals: Vec<Option<String>> = ends.iter().map(|e| e.id(names::TERMINAL)).collect();
        if let Some(node) = deferral_node(ctx, &terminals) {
            ctx.boundary.defer(&node, BoundaryEquipment::Transformer(ends));
            continue;
        }
        convert_transformer(ctx, &id, &ends, &terminals, &tap_changers)?;
    }
    Ok(())
}

fn convert_transformer(
    ctx: &mut Context,
    id: &str,
    ends: &[&PropertyBag],
    terminals: &[Option<String>],
    tap_changers: &TapChangersByEnd<'_>,
) -> Result<()> {
    let what = format!("PowerTransformer {}", id);
    if !(2..=3).contains(&ends.len()) {
        ctx.invalid(what, format!("{} ends, only two or three are supported", ends.len()));
        return Ok(());
    }
    let Some(end_points) = ctx.end_points(terminals)? else {
        ctx.missing(format!("Ends of {}", what));
        return Ok(());
    };

    let mut legs = Vec::with_capacity(ends.len());
    for (i, end) in ends.iter().enumerate() {
        let end_id = end.id(names::TRANSFORMER_END).unwrap_or_default();
        let ratio = tap_changers
            .ratio
            .get(&end_id)
            .and_then(|bag| ratio_tap_changer(ctx, &what, bag, i));
        let phase = tap_changers
            .phase
            .get(&end_id)
            .and_then(|bag| phase_tap_changer(ctx, &what, bag, i));
        legs.push(Leg {
            winding: winding(end),
            ratio,
            phase,
        });
    }

    let mut controls = Vec::new();
    let mut legs = legs.into_iter();
    let data = match (legs.next(), legs.next(), legs.next()) {
        (Some(l1), Some(l2), None) => {
            if l1.winding.rated_u.value() <= 0.0 || l2.winding.rated_u.value() <= 0.0 {
                ctx.invalid(what, "Rated voltages must be positive");
                return Ok(());
            }
            EquipmentData::TwoWindingsTransformer(two_windings(ctx, l1, l2, &mut controls))
        }
        (Some(l1), Some(l2), Some(l3)) => {
            let [w1, w2, w3] = [l1, l2, l3].map(|leg| leg.into_winding(&mut controls));
            let rated_u0 = w1.rated_u;
            EquipmentData::ThreeWindingsTransformer(ThreeWindingsTransformer {
                legs: [w1, w2, w3],
                rated_u0,
            })
        }
        _ => return Ok(()),
    };

    ctx.new_equipment(id, ends[0].get(names::NAME), data, &end_points)?;
    if !controls.is_empty() {
        ctx.regulating_controls
            .register(id, PendingControl::Transformer { tap_changers: controls })?;
    }
    Ok(())
}

/// A converted tap changer with the control it refers to.
struct Staged<T> {
    tap_changer: T,
    control: Option<TapChangerControl>,
}

/// One transformer end before the ends are combined.
struct Leg {
    winding: Winding,
    ratio: Option<Staged<RatioTapChanger>>,
    phase: Option<Staged<PhaseTapChanger>>,
}

impl Leg {
    fn into_winding(self, controls: &mut Vec<TapChangerControl>) -> Winding {
        let Leg {
            mut winding,
            ratio,
            phase,
        } = self;
        winding.ratio_tap_changer = ratio.map(|s| s.take_control(controls));
        winding.phase_tap_changer = phase.map(|s| s.take_control(controls));
        winding
    }
}

impl<T> Staged<T> {
    fn take_control(self, controls: &mut Vec<TapChangerControl>) -> T {
        controls.extend(self.control);
        self.tap_changer
    }
}

fn winding(end: &PropertyBag) -> Winding {
    Winding {
        r: Ohms(end.as_f64("r", 0.0)),
        x: Ohms(end.as_f64("x", 0.0)),
        g: Siemens(end.as_f64("g", 0.0)),
        b: Siemens(end.as_f64("b", 0.0)),
        rated_u: Kilovolts(end.as_f64("ratedU", 0.0)),
        rated_s: end.as_f64_opt("ratedS").map(MegavoltAmperes),
        ratio_tap_changer: None,
        phase_tap_changer: None,
    }
}

/// Refer both windings to side 2. Tap changers of end 2 move to side 1 with
/// inverted steps and are combined with those of end 1, one of each kind.
fn two_windings(
    ctx: &mut Context,
    l1: Leg,
    l2: Leg,
    controls: &mut Vec<TapChangerControl>,
) -> TwoWindingsTransformer {
    let (w1, w2) = (&l1.winding, &l2.winding);
    let rho = w2.rated_u.value() / w1.rated_u.value();
    let rho2 = rho * rho;
    let mut transformer = TwoWindingsTransformer {
        r: Ohms(w1.r.value() * rho2 + w2.r.value()),
        x: Ohms(w1.x.value() * rho2 + w2.x.value()),
        g: Siemens(w1.g.value() / rho2 + w2.g.value()),
        b: Siemens(w1.b.value() / rho2 + w2.b.value()),
        rated_u1: w1.rated_u,
        rated_u2: w2.rated_u,
        rated_s: w1.rated_s.or(w2.rated_s),
        ratio_tap_changer: None,
        phase_tap_changer: None,
    };

    let ratio2 = l2.ratio.map(|mut s| {
        s.tap_changer.steps = s
            .tap_changer
            .steps
            .iter()
            .map(|&r| if r != 0.0 { 1.0 / r } else { r })
            .collect();
        s
    });
    let phase2 = l2.phase.map(|mut s| {
        s.tap_changer.steps = s.tap_changer.steps.iter().map(|&a| Degrees(-a.value())).collect();
        s
    });

    transformer.ratio_tap_changer = combine(ctx, l1.ratio, ratio2, |kept, fixed| {
        let factor = fixed.steps[fixed.current()];
        for r in kept.steps.iter_mut() {
            *r *= factor;
        }
    })
    .map(|s| s.take_control(controls));
    transformer.phase_tap_changer = combine(ctx, l1.phase, phase2, |kept, fixed| {
        let shift = fixed.steps[fixed.current()].value();
        for a in kept.steps.iter_mut() {
            *a = Degrees(a.value() + shift);
        }
    })
    .map(|s| s.take_control(controls));

    for c in controls.iter_mut() {
        c.leg = 0;
    }
    transformer
}

/// Tap changer data shared by both kinds, used to combine two of the same kind.
trait Steps {
    fn id(&self) -> &str;
    fn step_count(&self) -> usize;
    /// Index of the current position in the step table
    fn current(&self) -> usize;
}

impl Steps for RatioTapChanger {
    fn id(&self) -> &str {
        &self.id
    }
    fn step_count(&self) -> usize {
        self.steps.len()
    }
    fn current(&self) -> usize {
        usize::try_from(self.tap_position - self.low_tap).unwrap_or(0)
    }
}

impl Steps for PhaseTapChanger {
    fn id(&self) -> &str {
        &self.id
    }
    fn step_count(&self) -> usize {
        self.steps.len()
    }
    fn current(&self) -> usize {
        usize::try_from(self.tap_position - self.low_tap).unwrap_or(0)
    }
}

/// Ordering used when two tap changers of one kind meet: a regulating one is
/// kept over a non regulating one, which is kept over a single step one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    SingleStep,
    NonRegulating,
    Regulating,
}

fn rank<T: Steps>(ctx: &Context, staged: &Staged<T>) -> Rank {
    if staged.tap_changer.step_count() <= 1 {
        return Rank::SingleStep;
    }
    let regulating = staged.control.as_ref().is_some_and(|c| {
        c.control_enabled
            && (c.kind == TapChangerKind::Phase || c.ltc_flag)
            && ctx
                .regulating_controls
                .control(&c.control_id)
                .is_some_and(|rc| rc.enabled && rc.mode != ControlMode::Fixed)
    });
    if regulating {
        Rank::Regulating
    } else {
        Rank::NonRegulating
    }
}

/// Keep the higher ranked tap changer (the first one on a tie) and fold the
/// other one, held at its current position, into its steps. The folded tap
/// changer's control is dropped.
fn combine<T: Steps>(
    ctx: &mut Context,
    first: Option<Staged<T>>,
    second: Option<Staged<T>>,
    fold: impl FnOnce(&mut T, &T),
) -> Option<Staged<T>> {
    let (first, second) = match (first, second) {
        (Some(a), Some(b)) => (a, b),
        (a, b) => return a.or(b),
    };
    let (mut kept, folded) = if rank(ctx, &second) > rank(ctx, &first) {
        (second, first)
    } else {
        (first, second)
    };
    let position = folded.tap_changer.current();
    if folded.tap_changer.step_count() > 1 {
        ctx.fixed(
            format!("TapChanger {}", folded.tap_changer.id()),
            format!(
                "Combined into {}, fixed at step index {}",
                kept.tap_changer.id(),
                position
            ),
        );
    }
    if position < folded.tap_changer.step_count() {
        fold(&mut kept.tap_changer, &folded.tap_changer);
    }
    if let Some(control) = &folded.control {
        debug!(
            tap_changer = folded.tap_changer.id(),
            control = %control.control_id,
            "control of combined tap changer dropped"
        );
    }
    Some(kept)
}

/// Largest step table accepted for one tap changer.
const MAX_TAP_STEPS: i64 = 1000;

/// Step range and current position, the position clamped into the range.
struct StepRange {
    low: i32,
    high: i32,
    neutral: i32,
    position: i32,
}

fn step_range(ctx: &mut Context, what: &str, bag: &PropertyBag) -> Option<StepRange> {
    let low = bag.as_i32("lowStep", 0);
    let high = bag.as_i32("highStep", low);
    if high < low {
        ctx.invalid(what, format!("highStep {} below lowStep {}", high, low));
        return None;
    }
    let count = i64::from(high) - i64::from(low) + 1;
    if count > MAX_TAP_STEPS {
        ctx.invalid(
            what,
            format!("{} steps, at most {} are supported", count, MAX_TAP_STEPS),
        );
        return None;
    }
    let neutral = bag.as_i32("neutralStep", low);
    // SV step positions may be fractional
    let step = bag
        .as_f64_opt("step")
        .map(|s| s.round() as i32)
        .unwrap_or(neutral);
    let position = step.clamp(low, high);
    if position != step {
        ctx.fixed_value(what, "Tap position outside step range", step, position);
    }
    Some(StepRange {
        low,
        high,
        neutral,
        position,
    })
}

fn pending_control(
    bag: &PropertyBag,
    tap_changer: &str,
    kind: TapChangerKind,
    leg: usize,
) -> Option<TapChangerControl> {
    Some(TapChangerControl {
        tap_changer: tap_changer.to_string(),
        kind,
        leg,
        control_id: bag.id(names::TAP_CHANGER_CONTROL)?,
        ltc_flag: bag.as_bool("ltcFlag", false),
        control_enabled: bag.as_bool(names::CONTROL_ENABLED, false),
    })
}

fn ratio_tap_changer(
    ctx: &mut Context,
    transformer: &str,
    bag: &PropertyBag,
    leg: usize,
) -> Option<Staged<RatioTapChanger>> {
    let id = bag.id("RatioTapChanger")?;
    let what = format!("RatioTapChanger {} of {}", id, transformer);
    let s = step_range(ctx, &what, bag)?;
    let increment = bag.as_f64("stepVoltageIncrement", 0.0);
    let ratios = (s.low..=s.high)
        .map(|step| 1.0 + f64::from(step - s.neutral) * increment / 100.0)
        .collect();
    let control = pending_control(bag, &id, TapChangerKind::Ratio, leg);
    debug!(tap_changer = %id, low = s.low, high = s.high, "ratio tap changer");
    Some(Staged {
        tap_changer: RatioTapChanger {
            id,
            low_tap: s.low,
            tap_position: s.position,
            steps: ratios,
            load_tap_changing_capabilities: bag.as_bool("ltcFlag", false),
            regulating: false,
            target_v: None,
            target_deadband: None,
            regulating_terminal: None,
        },
        control,
    })
}

fn phase_tap_changer(
    ctx: &mut Context,
    transformer: &str,
    bag: &PropertyBag,
    leg: usize,
) -> Option<Staged<PhaseTapChanger>> {
    let id = bag.id("PhaseTapChanger")?;
    let what = format!("PhaseTapChanger {} of {}", id, transformer);
    let s = step_range(ctx, &what, bag)?;
    let increment = bag.as_f64("stepPhaseShiftIncrement", 0.0);
    let angles = (s.low..=s.high)
        .map(|step| Degrees(f64::from(step - s.neutral) * increment))
        .collect();
    let control = pending_control(bag, &id, TapChangerKind::Phase, leg);
    Some(Staged {
        tap_changer: PhaseTapChanger {
            id,
            low_tap: s.low,
            tap_position: s.position,
            steps: angles,
            regulation_mode: PhaseRegulationMode::FixedTap,
            regulating: false,
            regulation_value: None,
            target_deadband: None,
            regulating_terminal: None,
        },
        control,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::fixtures::ModelBuilder;
    use crate::model::CgmesModel;
    use crate::regulating::apply;
    use gat_core::IssueKind;

    /// 400/220 kV transformer PT between CN1 and CN2, line L leaving CN2.
    fn two_winding_model() -> ModelBuilder {
        let mut b = ModelBuilder::node_breaker();
        b.substation("S");
        b.voltage_level("VL1", "S", 400.0).voltage_level("VL2", "S", 220.0);
        b.node("CN1", "VL1").node("CN2", "VL2").node("CN3", "VL2");
        b.transformer("PT", &["CN1", "CN2"]);
        b.line("L", "CN2", "CN3");
        b
    }

    fn converted<'a>(model: &'a CgmesModel, config: &'a ConversionConfig) -> Context<'a> {
        let mut ctx = Context::new(model, config).unwrap();
        crate::conversion::convert_elements(&mut ctx).unwrap();
        ctx
    }

    fn data<'c>(ctx: &'c Context, id: &str) -> &'c EquipmentData {
        let idx = ctx.network.find_equipment(id).unwrap();
        &ctx.network.equipment(idx).unwrap().data
    }

    #[test]
    fn test_two_windings_referred_to_side_two() {
        let model = two_winding_model().build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        let EquipmentData::TwoWindingsTransformer(t) = data(&ctx, "PT") else {
            panic!("not a two-winding transformer");
        };
        assert!((t.r.value() - 0.2 * 0.3025).abs() < 1e-12);
        assert!((t.x.value() - 12.0 * 0.3025).abs() < 1e-12);
        assert_eq!(t.rated_u1, Kilovolts(400.0));
        assert_eq!(t.rated_u2, Kilovolts(220.0));
    }

    #[test]
    fn test_ratio_steps_from_increment() {
        let mut b = two_winding_model();
        b.ratio_tap_changer("RTC", "PT_E1", None);
        let model = b.build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        let EquipmentData::TwoWindingsTransformer(t) = data(&ctx, "PT") else {
            panic!("not a two-winding transformer");
        };
        let rtc = t.ratio_tap_changer.as_ref().unwrap();
        assert_eq!(rtc.steps.len(), 21);
        assert!((rtc.steps[0] - 0.875).abs() < 1e-12);
        assert!((rtc.steps[10] - 1.0).abs() < 1e-12);
        assert_eq!(rtc.tap_position, 11);
        assert!(ctx.regulating_controls.pending("PT").is_none());
    }

    #[test]
    fn test_tap_position_clamped() {
        let mut b = two_winding_model();
        b.phase_tap_changer("PTC", "PT_E1", None);
        b.attribute("PhaseTapChanger", "PTC", "step", 14);
        let model = b.build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        let EquipmentData::TwoWindingsTransformer(t) = data(&ctx, "PT") else {
            panic!("not a two-winding transformer");
        };
        let ptc = t.phase_tap_changer.as_ref().unwrap();
        assert_eq!(ptc.tap_position, 10);
        assert_eq!(ptc.steps[20], Degrees(15.0));
        assert_eq!(ctx.diagnostics.count(IssueKind::Fixed), 1);
    }

    #[test]
    fn test_three_windings_keep_control_legs() {
        let mut b = ModelBuilder::node_breaker();
        b.substation("S");
        b.voltage_level("VL1", "S", 400.0)
            .voltage_level("VL2", "S", 220.0)
            .voltage_level("VL3", "S", 20.0);
        b.node("CN1", "VL1").node("CN2", "VL2").node("CN3", "VL3");
        b.transformer("PT", &["CN1", "CN2", "CN3"]);
        b.ratio_tap_changer("RTC", "PT_E3", Some("RC"));
        b.regulating_control("RC", "voltage", "PT_T3", 21.0, true);
        let model = b.build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        let EquipmentData::ThreeWindingsTransformer(t) = data(&ctx, "PT") else {
            panic!("not a three-winding transformer");
        };
        assert_eq!(t.rated_u0, Kilovolts(400.0));
        assert!(t.legs[2].ratio_tap_changer.is_some());
        let Some(PendingControl::Transformer { tap_changers }) = ctx.regulating_controls.pending("PT") else {
            panic!("no pending transformer control");
        };
        assert_eq!(tap_changers.len(), 1);
        assert_eq!(tap_changers[0].leg, 2);
        assert_eq!(tap_changers[0].control_id, "RC");
    }

    #[test]
    fn test_phase_tap_changer_wins_over_ratio() {
        let mut b = two_winding_model();
        b.ratio_tap_changer("RTC", "PT_E2", Some("RC_V"));
        b.phase_tap_changer("PTC", "PT_E1", Some("RC_P"));
        b.regulating_control("RC_V", "voltage", "PT_T2", 225.0, true);
        b.regulating_control("RC_P", "activePower", "L_T1", 100.0, true);
        let model = b.build();
        let config = ConversionConfig::default();
        let mut ctx = converted(&model, &config);
        apply::apply_all(&mut ctx);

        let EquipmentData::TwoWindingsTransformer(t) = data(&ctx, "PT") else {
            panic!("not a two-winding transformer");
        };
        let ptc = t.phase_tap_changer.as_ref().unwrap();
        assert!(ptc.regulating);
        assert_eq!(ptc.regulation_mode, PhaseRegulationMode::ActivePowerControl);
        assert_eq!(ptc.regulation_value, Some(100.0));
        let rtc = t.ratio_tap_changer.as_ref().unwrap();
        assert!(!rtc.regulating);
        assert_eq!(rtc.target_v, Some(Kilovolts(225.0)));
        assert_eq!(
            ctx.diagnostics.about("TapChanger RTC of PT").count(),
            1
        );
    }

    fn two_windings_of<'c>(ctx: &'c Context) -> &'c TwoWindingsTransformer {
        match data(ctx, "PT") {
            EquipmentData::TwoWindingsTransformer(t) => t,
            _ => panic!("not a two-winding transformer"),
        }
    }

    #[test]
    fn test_end_two_tap_changer_moved_with_inverted_steps() {
        let mut b = two_winding_model();
        b.ratio_tap_changer("RTC", "PT_E2", None);
        b.phase_tap_changer("PTC", "PT_E2", None);
        let model = b.build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        let t = two_windings_of(&ctx);
        let rtc = t.ratio_tap_changer.as_ref().unwrap();
        assert!((rtc.steps[0] - 1.0 / 0.875).abs() < 1e-12);
        assert!((rtc.steps[20] - 1.0 / 1.125).abs() < 1e-12);
        let ptc = t.phase_tap_changer.as_ref().unwrap();
        assert_eq!(ptc.steps[20], Degrees(-15.0));
    }

    #[test]
    fn test_combined_tap_changer_keeps_its_own_control() {
        let mut b = two_winding_model();
        b.ratio_tap_changer("RTC1", "PT_E1", Some("RC_V"));
        b.ratio_tap_changer("RTC2", "PT_E2", Some("RC_F"));
        b.regulating_control("RC_V", "voltage", "PT_T2", 225.0, true);
        b.regulating_control("RC_F", "fixed", "PT_T2", 0.0, true);
        let model = b.build();
        let config = ConversionConfig::default();
        let mut ctx = converted(&model, &config);

        let Some(PendingControl::Transformer { tap_changers }) = ctx.regulating_controls.pending("PT") else {
            panic!("no pending transformer control");
        };
        assert_eq!(tap_changers.len(), 1);
        assert_eq!(tap_changers[0].tap_changer, "RTC1");
        apply::apply_all(&mut ctx);

        let rtc = two_windings_of(&ctx).ratio_tap_changer.as_ref().unwrap();
        assert_eq!(rtc.id, "RTC1");
        assert!(rtc.regulating);
        assert_eq!(rtc.target_v, Some(Kilovolts(225.0)));
        assert_eq!(ctx.diagnostics.about("TapChanger RTC2").count(), 1);
        // never applied to anything, so still pending
        assert_eq!(ctx.diagnostics.about("Regulating control RC_F").count(), 1);
        assert_eq!(ctx.diagnostics.about("Regulating control RC_V").count(), 0);
    }

    #[test]
    fn test_regulating_tap_changer_kept_over_first_one() {
        let mut b = two_winding_model();
        b.ratio_tap_changer("RTC1", "PT_E1", None);
        b.attribute("RatioTapChanger", "RTC1", "step", 13);
        b.ratio_tap_changer("RTC2", "PT_E2", Some("RC_V"));
        b.regulating_control("RC_V", "voltage", "PT_T2", 225.0, true);
        let model = b.build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        let rtc = two_windings_of(&ctx).ratio_tap_changer.as_ref().unwrap();
        assert_eq!(rtc.id, "RTC2");
        // RTC2 inverted, times RTC1 held at 1.025
        assert!((rtc.steps[0] - 1.025 / 0.875).abs() < 1e-12);
        assert!((rtc.steps[10] - 1.025).abs() < 1e-12);
        let fixed: Vec<_> = ctx.diagnostics.about("TapChanger RTC1").collect();
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].kind, IssueKind::Fixed);
    }

    #[test]
    fn test_oversized_step_range_is_invalid() {
        let mut b = two_winding_model();
        b.ratio_tap_changer("RTC", "PT_E1", None);
        b.attribute("RatioTapChanger", "RTC", "highStep", i32::MAX);
        let model = b.build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        assert!(two_windings_of(&ctx).ratio_tap_changer.is_none());
        let invalid: Vec<_> = ctx.diagnostics.about("RatioTapChanger RTC of PowerTransformer PT").collect();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].kind, IssueKind::Invalid);
    }

    #[test]
    fn test_single_end_is_invalid() {
        let mut b = ModelBuilder::node_breaker();
        b.substation("S");
        b.voltage_level("VL", "S", 400.0);
        b.node("CN", "VL");
        b.transformer("PT", &["CN"]);
        let model = b.build();
        let config = ConversionConfig::default();
        let ctx = converted(&model, &config);

        assert!(ctx.network.find_equipment("PT").is_none());
        assert_eq!(ctx.diagnostics.about("PowerTransformer PT").count(), 1);
    }
}
