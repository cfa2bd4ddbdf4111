#[cfg(test)]
mod tests_impl {
    use crate::config::BouncerConfig;
    use crate::core::backend::{
        AnyBackend, Backend, BackendSupport, Engine, Outcome, Platform, new_backend_on,
    };
    use crate::core::decision::Decision;
    use crate::core::test_helpers::{RecordingInvoker, fixture_layout};

    /// pf backend built through the factory, with fixture device and tool
    fn pf_backend(
        disable_ipv6: bool,
        invoker: RecordingInvoker,
    ) -> (tempfile::TempDir, AnyBackend<RecordingInvoker>) {
        let (dir, layout) = fixture_layout("crowdsec-blacklists", "crowdsec6-blacklists");
        let mut config = BouncerConfig {
            disable_ipv6,
            ..BouncerConfig::default()
        };
        config.pf.pfctl_path = layout.tool;
        config.pf.device = layout.device.unwrap();

        match new_backend_on(Platform::FreeBsd, &config, invoker) {
            BackendSupport::Supported(backend) => (dir, backend),
            BackendSupport::Unsupported { reason, .. } => panic!("unexpected: {reason}"),
        }
    }

    #[tokio::test]
    async fn test_bruteforce_scenario_ipv6_disabled() {
        let invoker = RecordingInvoker::new().respond("-s Tables", 0, "crowdsec-blacklists\n");
        let (_dir, mut backend) = pf_backend(true, invoker.clone());
        let decision = Decision::new("203.0.113.7", "4h", "bruteforce");

        backend.init().await.unwrap();
        invoker.clear();

        backend.add(&decision).await.unwrap();
        assert_eq!(
            invoker.arg_lines(),
            vec!["-t crowdsec-blacklists -T add 203.0.113.7"]
        );

        invoker.clear();
        backend.delete(&decision).await.unwrap();
        assert_eq!(
            invoker.arg_lines(),
            vec!["-t crowdsec-blacklists -T delete 203.0.113.7"]
        );
    }

    #[tokio::test]
    async fn test_full_lifecycle_in_order() {
        let invoker = RecordingInvoker::new().respond(
            "-s Tables",
            0,
            "crowdsec-blacklists\ncrowdsec6-blacklists\n",
        );
        let (_dir, mut backend) = pf_backend(false, invoker.clone());

        backend.init().await.unwrap();
        backend
            .add(&Decision::new("2001:db8::1", "1h", "http-probing"))
            .await
            .unwrap();
        backend
            .add(&Decision::new("198.51.100.0/24", "24h", "cti"))
            .await
            .unwrap();
        backend
            .delete(&Decision::new("2001:db8::1", "-1s", "http-probing"))
            .await
            .unwrap();
        backend.commit().await.unwrap();
        backend.shut_down().await.unwrap();

        assert_eq!(
            invoker.arg_lines(),
            vec![
                "-t crowdsec-blacklists -T flush",
                "-s Tables",
                "-t crowdsec6-blacklists -T flush",
                "-s Tables",
                "-t crowdsec6-blacklists -T add 2001:db8::1",
                "-t crowdsec-blacklists -T add 198.51.100.0/24",
                "-t crowdsec6-blacklists -T delete 2001:db8::1",
                "-t crowdsec-blacklists -T flush",
                "-t crowdsec6-blacklists -T flush",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_decision_does_not_stop_later_ones() {
        let invoker = RecordingInvoker::new().respond(
            "-t crowdsec-blacklists -T add 203.0.113.300",
            1,
            "pfctl: Invalid argument.\n",
        );
        let (_dir, mut backend) = pf_backend(true, invoker.clone());

        let first = backend
            .add(&Decision::new("203.0.113.300", "4h", "bruteforce"))
            .await
            .unwrap();
        let second = backend
            .add(&Decision::new("203.0.113.8", "4h", "bruteforce"))
            .await
            .unwrap();

        assert!(first.is_tolerated());
        assert_eq!(second, Outcome::Applied);
        assert_eq!(invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_nftables_through_factory_commits_batch() {
        let invoker = RecordingInvoker::new();
        let mut config = BouncerConfig {
            mode: Engine::Nftables,
            ..BouncerConfig::default()
        };
        config.nftables.nft_path = "sh".into();

        let BackendSupport::Supported(mut backend) =
            new_backend_on(Platform::Linux, &config, invoker.clone())
        else {
            panic!("nftables must be supported on Linux");
        };

        backend.init().await.unwrap();
        invoker.clear();

        let outcome = backend
            .add(&Decision::new("203.0.113.7", "4h", "bruteforce"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Queued);
        assert!(invoker.calls().is_empty());

        backend.commit().await.unwrap();
        assert_eq!(invoker.arg_lines(), vec!["-f -"]);
    }
}

#[cfg(test)]
mod proptests {
    use crate::core::backend::{Backend, Outcome};
    use crate::core::decision::{Decision, Family};
    use crate::core::pf::PfBackend;
    use crate::core::test_helpers::{RecordingInvoker, fixture_layout};
    use proptest::prelude::*;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    /// IPv6-looking values: anything with at least one colon
    fn arb_ipv6_value() -> impl Strategy<Value = String> {
        ("[0-9a-f]{0,4}", "[0-9a-f:]{0,20}").prop_map(|(head, tail)| format!("{head}:{tail}"))
    }

    fn arb_ipv4_value() -> impl Strategy<Value = String> {
        (any::<[u8; 4]>(), proptest::option::of(0u8..=32)).prop_map(|(o, prefix)| {
            let addr = format!("{}.{}.{}.{}", o[0], o[1], o[2], o[3]);
            match prefix {
                Some(p) => format!("{addr}/{p}"),
                None => addr,
            }
        })
    }

    proptest! {
        #[test]
        fn ipv6_decisions_are_dropped_without_invocation(value in arb_ipv6_value()) {
            let invoker = RecordingInvoker::new();
            let (_dir, layout) = fixture_layout("v4", "v6");
            let mut pf = PfBackend::with_invoker(layout, true, invoker.clone());
            let decision = Decision::new(value, "4h", "prop");

            let added = block_on(pf.add(&decision)).unwrap();
            let deleted = block_on(pf.delete(&decision)).unwrap();

            prop_assert_eq!(added, Outcome::Skipped);
            prop_assert_eq!(deleted, Outcome::Skipped);
            prop_assert!(invoker.calls().is_empty());
        }

        #[test]
        fn decisions_reach_exactly_their_family_table(
            value in prop_oneof![arb_ipv4_value(), arb_ipv6_value()]
        ) {
            let invoker = RecordingInvoker::new();
            let (_dir, layout) = fixture_layout("v4", "v6");
            let mut pf = PfBackend::with_invoker(layout, false, invoker.clone());
            let decision = Decision::new(value.clone(), "4h", "prop");

            block_on(pf.add(&decision)).unwrap();

            let expected_table = match Family::of(&value) {
                Family::Ipv4 => "v4",
                Family::Ipv6 => "v6",
            };
            let calls = invoker.calls();
            prop_assert_eq!(calls.len(), 1);
            prop_assert_eq!(&calls[0].args[1], expected_table);
            prop_assert_eq!(&calls[0].args[4], &value);
        }

        #[test]
        fn engine_rejections_never_fail_the_caller(code in 1i32..=255, output in ".{0,64}") {
            let invoker = RecordingInvoker::new().respond("-t v4 -T", code, &output);
            let (_dir, layout) = fixture_layout("v4", "v6");
            let mut pf = PfBackend::with_invoker(layout, false, invoker);
            let decision = Decision::new("192.0.2.1", "4h", "prop");

            let added = block_on(pf.add(&decision)).unwrap();
            let deleted = block_on(pf.delete(&decision)).unwrap();

            prop_assert!(added.is_tolerated());
            prop_assert!(deleted.is_tolerated());
        }
    }
}
