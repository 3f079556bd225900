mod common;

#[cfg(test)]
mod tests {
    use std::sync::{atomic::Ordering, Arc};

    use hc_smarthq::*;

    use super::common::*;

    fn wrapper(appliance: &Arc<MockAppliance>) -> (ApplianceWrapper, Arc<MockEntity>) {
        let entity = MockEntity::new(format!("{}_state", appliance.id()));
        let entities: Vec<Arc<dyn Entity>> = vec![entity.clone()];
        (ApplianceWrapper::new(appliance_ref(appliance), entities), entity)
    }

    #[test]
    fn test_device_info_from_properties() {
        let appliance = MockAppliance::dishwasher("D8:28:C9:00:00:01");
        appliance.set(PropertyCode::MODEL_NUMBER, PropertyValue::Text("PDT715SYN".into()));
        appliance.set(PropertyCode::SERIAL_NUMBER, PropertyValue::Text("ZS123456".into()));
        appliance.set(PropertyCode::APPLIANCE_SW_VERSION, PropertyValue::Text("1.2.3".into()));
        let (wrapper, _) = wrapper(&appliance);

        let info = wrapper.device_info();
        assert_eq!(info.name, "GE Profile Dishwasher ZS123456");
        assert_eq!(info.manufacturer, "GE Profile");
        assert_eq!(info.model.as_deref(), Some("PDT715SYN"));
        assert_eq!(info.sw_version, "Appliance=1.2.3/Wifi=Unknown");
    }

    #[test]
    fn test_blank_serial_falls_back_to_mac() {
        let appliance = MockAppliance::new("D8:28:C9:00:00:02", Some(ApplianceKind::DualDishwasher));
        appliance.set(PropertyCode::SERIAL_NUMBER, PropertyValue::Text("0000000".into()));
        appliance.set(PropertyCode::BRAND, PropertyValue::Text("Café".into()));
        let (wrapper, _) = wrapper(&appliance);

        assert_eq!(wrapper.serial_or_mac(), "D8:28:C9:00:00:02");
        assert_eq!(wrapper.name(), "Café Dual Dishwasher D8:28:C9:00:00:02");
    }

    #[test]
    fn test_brand_inference_from_model() {
        assert_eq!(Brand::infer_from_model("CVE28DP4NW2"), Some(Brand::Cafe));
        assert_eq!(Brand::infer_from_model("ZIC30GNZII"), Some(Brand::Monogram));
        assert_eq!(Brand::infer_from_model("QNHE2502"), Some(Brand::Haier));
        assert_eq!(Brand::infer_from_model("opal01gen2"), Some(Brand::Ge));
        assert_eq!(Brand::infer_from_model("XPIO23"), Some(Brand::GeProfile));
        assert_eq!(Brand::infer_from_model("7ABC"), None);
        assert_eq!(Brand::infer_from_model("  "), None);
        assert_eq!(Brand::from_label("GE Profile"), Some(Brand::GeProfile));
    }

    #[test]
    fn test_record_changes_reports_only_changed_codes() {
        let (wrapper, _) = wrapper(&MockAppliance::dishwasher("aa:01"));
        let changed = wrapper.record_changes([
            (PropertyCode::SABBATH_MODE, PropertyValue::Bool(false)),
            (PropertyCode::CLOCK_TIME, PropertyValue::Raw(vec![1, 2])),
        ]);
        assert_eq!(changed.len(), 2);

        let changed = wrapper.record_changes([
            (PropertyCode::SABBATH_MODE, PropertyValue::Bool(false)),
            (PropertyCode::CLOCK_TIME, PropertyValue::Raw(vec![1, 3])),
        ]);
        assert_eq!(changed, vec![PropertyCode::CLOCK_TIME]);

        let store = wrapper.property_values();
        let entry = store.get_value_entry(&PropertyCode::SABBATH_MODE).unwrap();
        assert!(entry.last_changed <= entry.last_received);
    }

    #[test]
    fn test_propagation_skips_unattached_and_survives_failures() {
        let (first, first_entity) = wrapper(&MockAppliance::dishwasher("aa:01"));
        let (second, second_entity) = wrapper(&MockAppliance::dishwasher("aa:02"));
        let (third, third_entity) = wrapper(&MockAppliance::dishwasher("aa:03"));
        first_entity.failing.store(true, Ordering::SeqCst);
        second_entity.attached.store(false, Ordering::SeqCst);

        let summary = publish_all(&[Arc::new(first), Arc::new(second), Arc::new(third)]);
        assert_eq!(
            summary,
            PublishSummary {
                published: 1,
                skipped: 1,
                failed: 1
            }
        );
        assert_eq!(second_entity.publishes(), 0);
        assert_eq!(third_entity.publishes(), 1);
    }

    #[test]
    fn test_notifier_dismisses_only_shown_notifications() {
        let sink = Arc::new(RecordingNotifications::default());
        let notifier = Notifier::new(sink.clone());

        assert!(!notifier.dismiss("x_connection"));
        assert_eq!(notifier.show("x_connection", "title", "one"), NotificationUpdate::New);
        assert_eq!(notifier.show("x_connection", "title", "one"), NotificationUpdate::Equal);
        assert_eq!(
            notifier.show("x_connection", "title", "two"),
            NotificationUpdate::Changed {
                old_message: "one".into()
            }
        );
        assert_eq!(sink.created_ids().len(), 3);
        assert!(notifier.is_shown("x_connection"));

        notifier.show("x_authentication", "title", "auth");
        assert!(notifier.dismiss("x_connection"));
        notifier.dismiss_all();
        assert_eq!(
            sink.dismissed_ids(),
            vec!["x_connection".to_owned(), "x_authentication".to_owned()]
        );
        assert!(!notifier.is_shown("x_authentication"));
    }
}
