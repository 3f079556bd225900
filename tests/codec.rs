#[cfg(test)]
mod tests {
    use hc_smarthq::*;

    #[test]
    fn test_enum_codec_decodes_labels() {
        let table = VendorProfile::for_brand(Brand::Haier).codec_table();
        assert_eq!(
            table.decode_hex(&PropertyCode::HAIER_HOOD_FAN_SPEED, "04").unwrap(),
            PropertyValue::Enum {
                raw: 4,
                label: "Boost".into()
            }
        );
        assert_eq!(
            table.decode(&PropertyCode::HAIER_HOOD_LIGHT, &[1]).unwrap(),
            PropertyValue::Enum {
                raw: 1,
                label: "On".into()
            }
        );
        let unknown = table.decode(&PropertyCode::HAIER_HOOD_FAN_SPEED, &[9]).unwrap();
        assert_eq!(unknown.as_text(), Some("Unknown (0x09)"));
    }

    #[test]
    fn test_enum_codec_encodes_labels_names_digits_and_bools() {
        let table = VendorProfile::Haier.codec_table();
        let fan = PropertyCode::HAIER_HOOD_FAN_SPEED;
        assert_eq!(table.encode(&fan, &PropertyValue::Text("Medium".into())).unwrap(), vec![2]);
        assert_eq!(table.encode(&fan, &PropertyValue::Text("  boost ".into())).unwrap(), vec![4]);
        assert_eq!(table.encode(&fan, &PropertyValue::Text("3".into())).unwrap(), vec![3]);
        assert_eq!(table.encode(&fan, &PropertyValue::Int(1)).unwrap(), vec![1]);
        assert!(matches!(
            table.encode(&fan, &PropertyValue::Text("turbo".into())),
            Err(CodecError::UnknownOption(_))
        ));

        let light = PropertyCode::HAIER_HOOD_LIGHT;
        assert_eq!(table.encode(&light, &PropertyValue::Bool(true)).unwrap(), vec![1]);
        assert_eq!(table.encode(&light, &PropertyValue::Text("false".into())).unwrap(), vec![0]);
    }

    #[test]
    fn test_standard_profile_has_no_vendor_codecs() {
        let table = VendorProfile::for_brand(Brand::Ge).codec_table();
        assert!(table.get(&PropertyCode::HAIER_HOOD_FAN_SPEED).is_none());
        assert_eq!(
            table.decode(&PropertyCode::HAIER_HOOD_FAN_SPEED, &[4]).unwrap(),
            PropertyValue::Raw(vec![4])
        );
        assert!(VendorProfile::Haier.codec_table().len() > table.len());
    }

    #[test]
    fn test_text_and_bool_codecs() {
        let table = VendorProfile::Standard.codec_table();
        assert_eq!(
            table.decode(&PropertyCode::MODEL_NUMBER, b"PVX7300\0\0").unwrap(),
            PropertyValue::Text("PVX7300".into())
        );
        assert_eq!(
            table.decode(&PropertyCode::SABBATH_MODE, &[1]).unwrap(),
            PropertyValue::Bool(true)
        );
        assert_eq!(
            table.decode(&PropertyCode::SABBATH_MODE, &[]),
            Err(CodecError::Length {
                expected: 1,
                actual: 0
            })
        );
        assert_eq!(
            TextCodec.decode(&[0xFF, 0xFE]),
            Err(CodecError::InvalidText)
        );
    }

    #[test]
    fn test_int_codec_is_big_endian_and_range_checked() {
        let codec = IntCodec::unsigned(2);
        assert_eq!(codec.decode(&[0x01, 0x02]).unwrap(), PropertyValue::Int(258));
        assert_eq!(codec.encode(&PropertyValue::Int(258)).unwrap(), vec![0x01, 0x02]);
        assert!(matches!(
            codec.encode(&PropertyValue::Int(70_000)),
            Err(CodecError::OutOfRange { .. })
        ));

        let signed = IntCodec::signed(1);
        assert_eq!(signed.decode(&[0xFF]).unwrap(), PropertyValue::Int(-1));
        assert_eq!(signed.encode(&PropertyValue::Int(-2)).unwrap(), vec![0xFE]);
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(decode_hex("0a1B").unwrap(), vec![0x0A, 0x1B]);
        assert!(matches!(decode_hex("abc"), Err(CodecError::InvalidHex(_))));
        assert!(matches!(decode_hex("zz"), Err(CodecError::InvalidHex(_))));
        assert_eq!(encode_hex(&[0x0A, 0x1B]), "0A1B");
    }

    #[test]
    fn test_custom_table_builder() {
        let code = PropertyCode::new(0x7001);
        let table = CodecTable::builder()
            .with(code, EnumCodec::new().option(0, "Idle").option(5, "Running"))
            .build();
        assert_eq!(
            table.decode(&code, &[5]).unwrap().as_text(),
            Some("Running")
        );
        assert_eq!(
            table.encode(&PropertyCode::new(0x7002), &PropertyValue::Raw(vec![7])).unwrap(),
            vec![7]
        );
        assert!(table.encode(&PropertyCode::new(0x7002), &PropertyValue::Int(7)).is_err());
    }

    #[test]
    fn test_property_code_parsing() {
        assert_eq!("0x5B13".parse::<PropertyCode>().unwrap(), PropertyCode::HAIER_HOOD_FAN_SPEED);
        assert_eq!("5b17".parse::<PropertyCode>().unwrap(), PropertyCode::HAIER_HOOD_LIGHT);
        assert!("0xZZ".parse::<PropertyCode>().is_err());
        assert_eq!(PropertyCode::BRAND.to_string(), "0x0035");
    }
}
