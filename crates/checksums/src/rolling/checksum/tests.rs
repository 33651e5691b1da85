use super::*;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[test]
fn x86_cpu_feature_detection_is_cached() {
    x86::load_cpu_features_for_tests();
    assert!(x86::cpu_features_cached_for_tests());
}
