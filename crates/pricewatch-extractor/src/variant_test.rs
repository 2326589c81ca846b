use pricewatch_core::DEFAULT_CONTROL_PRIORITY;

use super::*;
use crate::test_support::{FakePage, FakeSession};

const PAGE: &str = r#"
<html><body>
  <div class="product-info">
    <span class="price">$1,499.00</span>
    <select id="power" name="power">
      <option value="">Choose power</option>
      <option value="40">40 Watt</option>
      <option value="60">60 Watt</option>
      <option value="100" disabled>100 Watt (sold out)</option>
    </select>
    <fieldset>
      <input type="radio" id="pkg-base" name="package" value="base"><label for="pkg-base">Machine only</label>
      <input type="radio" id="pkg-kit" name="package" value="kit"><label for="pkg-kit">Starter Kit (+$300)</label>
    </fieldset>
    <div class="swatches">
      <button data-value="black">Black</button>
      <button data-value="white">White</button>
    </div>
  </div>
</body></html>
"#;

fn price_probe(html: &str) -> Option<Decimal> {
    let doc = PageDocument::parse(html);
    let el = doc.select(".price").ok()?.into_iter().next()?;
    NumericPriceParser::default().parse_amount(&el.text_content())
}

#[test]
fn signature_extracts_power_and_base_name() {
    let sig = VariantSignature::parse("Model X 60W");
    assert_eq!(sig.primary.as_deref(), Some("60W"));
    assert_eq!(sig.package, None);
    assert_eq!(sig.base_name, "Model X");
    assert_eq!(sig.variant_key(), "60W");
}

#[test]
fn signature_normalizes_watts_and_kilowatts() {
    assert_eq!(
        VariantSignature::parse("Cutter 1.5 kW").primary.as_deref(),
        Some("1.5KW")
    );
    assert_eq!(
        VariantSignature::parse("Laser 100 Watts").primary.as_deref(),
        Some("100W")
    );
}

#[test]
fn signature_falls_back_to_size_and_keeps_package_word() {
    let sig = VariantSignature::parse("Smoker 24\" Bundle");
    assert_eq!(sig.primary.as_deref(), Some("24IN"));
    assert_eq!(sig.package.as_deref(), Some("bundle"));
    assert_eq!(sig.base_name, "Smoker");
    assert_eq!(sig.variant_key(), "24IN+bundle");
}

#[test]
fn signature_without_variant_tokens() {
    let sig = VariantSignature::parse("Burr Grinder");
    assert!(sig.primary.is_none());
    assert_eq!(sig.variant_key(), "default");
    assert_eq!(sig.base_name, "Burr Grinder");
}

#[test]
fn primary_match_ignores_formatting_but_not_value() {
    let sig = VariantSignature::parse("Model X 60W");
    assert!(sig.primary_matches("60 Watt"));
    assert!(sig.primary_matches("Power: 60w"));
    assert!(!sig.primary_matches("160W"));
    assert!(!sig.primary_matches("60 mm"));
}

#[test]
fn discovers_dropdown_radio_and_button_controls() {
    let doc = PageDocument::parse(PAGE);
    let controls = discover_controls(&doc);

    let dropdown: Vec<_> = controls
        .iter()
        .filter(|c| c.kind == ControlKind::Dropdown)
        .collect();
    assert_eq!(dropdown.len(), 2, "placeholder and disabled options skipped");
    assert_eq!(dropdown[1].value, "60");
    assert_eq!(dropdown[1].css, "[id=\"power\"]");

    let radios: Vec<_> = controls
        .iter()
        .filter(|c| c.kind == ControlKind::Radio)
        .collect();
    assert_eq!(radios.len(), 2);
    assert_eq!(radios[0].label, "Machine only");
    assert_eq!(radios[0].group, "package");

    let buttons = controls
        .iter()
        .filter(|c| c.kind == ControlKind::Button)
        .count();
    assert_eq!(buttons, 2);
}

#[test]
fn plan_selects_power_then_base_package() {
    let doc = PageDocument::parse(PAGE);
    let controls = discover_controls(&doc);
    let sig = VariantSignature::parse("Model X 60W");
    let plan = plan(&sig, &controls, &DEFAULT_CONTROL_PRIORITY, None);

    assert_eq!(plan.primary_matched, Some(true));
    assert_eq!(
        plan.actions,
        vec![
            VariantAction::Select {
                css: "[id=\"power\"]".to_string(),
                value: "60".to_string(),
                label: "60 Watt".to_string(),
            },
            VariantAction::Settle,
            VariantAction::Click {
                css: "[id=\"pkg-base\"]".to_string(),
                label: "Machine only".to_string(),
            },
            VariantAction::Settle,
        ]
    );
}

#[test]
fn plan_picks_kit_only_when_requested() {
    let doc = PageDocument::parse(PAGE);
    let controls = discover_controls(&doc);
    let sig = VariantSignature::parse("Model X 60W Kit");
    let plan = plan(&sig, &controls, &DEFAULT_CONTROL_PRIORITY, None);
    assert!(plan.actions.contains(&VariantAction::Click {
        css: "[id=\"pkg-kit\"]".to_string(),
        label: "Starter Kit (+$300)".to_string(),
    }));
}

#[test]
fn plan_reports_unmatched_primary() {
    let doc = PageDocument::parse(PAGE);
    let controls = discover_controls(&doc);
    let sig = VariantSignature::parse("Model X 80W");
    let plan = plan(&sig, &controls, &DEFAULT_CONTROL_PRIORITY, None);
    assert_eq!(plan.primary_matched, Some(false));
    assert!(!plan
        .actions
        .iter()
        .any(|a| matches!(a, VariantAction::Select { .. })));
}

#[test]
fn hint_overrides_token_matching() {
    let doc = PageDocument::parse(PAGE);
    let controls = discover_controls(&doc);
    let sig = VariantSignature::parse("Model X");
    let hint = ResolutionHint::Button {
        option_match: "white".to_string(),
    };
    let plan = plan(&sig, &controls, &DEFAULT_CONTROL_PRIORITY, Some(&hint));
    assert_eq!(plan.primary_matched, Some(true));
    assert_eq!(
        plan.actions[0],
        VariantAction::Click {
            css: "[data-value=\"white\"]".to_string(),
            label: "White".to_string(),
        }
    );
}

#[tokio::test]
async fn execute_applies_actions_and_waits_for_price_change() {
    let after_power = PAGE.replace("$1,499.00", "$1,849.00");
    let page = FakePage::static_html(PAGE)
        .on_select("[id=\"power\"]", "60", &after_power)
        .on_click("[id=\"pkg-base\"]", &after_power);
    let mut session = FakeSession::new(page);

    let doc = PageDocument::parse(PAGE);
    let controls = discover_controls(&doc);
    let plan = plan(
        &VariantSignature::parse("Model X 60W"),
        &controls,
        &DEFAULT_CONTROL_PRIORITY,
        None,
    );

    let resolver = VariantResolver {
        settle_timeout: Duration::from_millis(100),
        settle_poll: Duration::from_millis(5),
        action_attempts: 2,
    };
    let outcome = resolver.execute(&mut session, &plan, price_probe).await;
    assert_eq!(outcome, VariantResolution::Resolved);
    assert_eq!(
        price_probe(&session.content().await.unwrap()),
        Some(Decimal::new(1849, 0))
    );
    assert_eq!(
        session.log(),
        vec!["select [id=\"power\"]=60", "click [id=\"pkg-base\"]"]
    );
}

#[tokio::test]
async fn failing_interaction_is_unresolved() {
    let mut session = FakeSession::new(FakePage::static_html(PAGE));
    let doc = PageDocument::parse(PAGE);
    let controls = discover_controls(&doc);
    let plan = plan(
        &VariantSignature::parse("Model X 60W"),
        &controls,
        &DEFAULT_CONTROL_PRIORITY,
        None,
    );
    let resolver = VariantResolver {
        settle_timeout: Duration::from_millis(10),
        settle_poll: Duration::from_millis(1),
        action_attempts: 2,
    };
    let outcome = resolver.execute(&mut session, &plan, price_probe).await;
    assert_eq!(outcome, VariantResolution::Unresolved);
    assert_eq!(session.log().len(), 4, "two attempts per action");
}

#[tokio::test]
async fn no_variant_and_no_controls_is_not_needed() {
    let mut session = FakeSession::new(FakePage::static_html("<p>$10</p>"));
    let plan = plan(
        &VariantSignature::parse("Burr Grinder"),
        &[],
        &DEFAULT_CONTROL_PRIORITY,
        None,
    );
    let outcome = VariantResolver::default()
        .execute(&mut session, &plan, price_probe)
        .await;
    assert_eq!(outcome, VariantResolution::NotNeeded);
}
