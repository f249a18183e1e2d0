//! Optional inclusion of an externally authored template.

use tracing::info;

use strata_core::BaseStack;
use strata_iac::{IacResult, IncludedTemplate, TemplateDescriptor, TemplateSource, TemplateStackHooks};

pub(crate) const TEMPLATE_FIELD: &str = "Template";

/// Reads the `Template` mapping (`TemplatePath` plus `Parameters`) of the
/// stack configuration. Without one the stack stays empty.
#[derive(Debug, Default)]
pub struct IncludedTemplateHooks;

impl TemplateStackHooks for IncludedTemplateHooks {
    fn load_template_descriptor(&mut self, stack: &BaseStack<'_>) -> IacResult<TemplateSource> {
        Ok(match stack.config().deserialize::<TemplateDescriptor>(TEMPLATE_FIELD)? {
            Some(descriptor) => TemplateSource::Include(descriptor),
            None => TemplateSource::Absent,
        })
    }

    fn on_ready(&mut self, stack: &mut BaseStack<'_>, template: Option<&IncludedTemplate>) -> IacResult<()> {
        if let Some(template) = template {
            let ids: Vec<&str> = template.resource_ids().collect();
            stack.put_variable("TemplateResources", ids.join(","));
            info!("{}: template resources {}", stack.canonical_name(), ids.join(", "));
        }
        Ok(())
    }
}
