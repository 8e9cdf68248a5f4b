/// Recognizes runtime-generated proxy classes (KVO-style swizzled subclasses)
pub trait ProxyMatcher: Send + Sync {
    fn name(&self) -> &'static str;
    /// Name of the class the proxy stands in for, or `None` if `type_name` is not a proxy
    fn base_name(&self, type_name: &str) -> Option<String>;
}
