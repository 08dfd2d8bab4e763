/// True when the click target carries a "grant permission forever" marker.
/// Such clicks are short-circuited to the terminate path so the agent never
/// grants a persistent permission on its own.
pub fn is_grant_forever_target(target_element: &str, markers: &[String]) -> bool {
    !target_element.is_empty() && markers.iter().any(|m| target_element.contains(m.as_str()))
}

/// True when the target app is known to reject programmatic text entry and
/// the user must type manually.
pub fn requires_manual_input(package: &str, manual_packages: &[String]) -> bool {
    manual_packages.iter().any(|p| p == package)
}
