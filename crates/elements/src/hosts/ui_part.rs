use std::sync::Arc;

use async_trait::async_trait;
use cke5_dom::NodeId;
use cke5_engine::{Editor, UiRegion};

use super::{HostBehavior, MountContext, until_disconnected};
use crate::descriptor::{ATTR_EDITOR_ID, ATTR_NAME, require_attribute};
use crate::{HostError, Result, Session, UI_PART_TAG};

/// `<cke5-ui-part>`: moves an editor's toolbar or menu bar into the host.
#[derive(Debug, Default)]
pub struct UiPartHost;

pub struct MountedUiPart {
	region: UiRegion,
}

fn parse_region(name: &str) -> Result<UiRegion> {
	match name {
		"toolbar" => Ok(UiRegion::Toolbar),
		"menubar" => Ok(UiRegion::Menubar),
		other => Err(HostError::UnknownUiPart(other.to_string())),
	}
}

#[async_trait]
impl HostBehavior for UiPartHost {
	const TAG: &'static str = UI_PART_TAG;

	type Mounted = MountedUiPart;

	async fn mount(cx: &MountContext<MountedUiPart>) -> Result<()> {
		cx.document().wait_ready().await;
		cx.check()?;
		let region = parse_region(&require_attribute(cx.document(), cx.node, UI_PART_TAG, ATTR_NAME)?)?;
		let editor_id = cx
			.document()
			.attribute(cx.node, ATTR_EDITOR_ID)
			.or_else(|| cx.session.query_all_editor_ids().into_iter().next());

		let execution = cx.session.editors().execute(editor_id.as_deref(), move |editor: Arc<dyn Editor>| editor.ui_element(region));
		let Some(element) = until_disconnected(&cx.token, execution).await?? else {
			tracing::warn!(?region, "ui_part.missing");
			return Ok(());
		};
		cx.check()?;

		cx.store(MountedUiPart { region });
		cx.document().append_child(cx.node, element)?;
		tracing::debug!(?region, "ui_part.mounted");
		Ok(())
	}

	async fn unmount(session: &Arc<Session>, node: NodeId, mounted: MountedUiPart) {
		if let Err(err) = session.document().clear_children(node) {
			tracing::debug!(region = ?mounted.region, error = %err, "ui_part.clear");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_known_regions() {
		assert_eq!(parse_region("toolbar").ok(), Some(UiRegion::Toolbar));
		assert_eq!(parse_region("menubar").ok(), Some(UiRegion::Menubar));
		assert!(matches!(parse_region("sidebar"), Err(HostError::UnknownUiPart(name)) if name == "sidebar"));
	}
}
