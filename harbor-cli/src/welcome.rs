//! The built-in welcome extension.

use harbor_plugin_sdk::prelude::*;
use serde_json::{Value, json};

pub const NAME: &str = "harbor-welcome";

#[derive(Default)]
pub struct Welcome {
    cx: Option<ExtensionContext>,
}

#[async_trait]
impl Extension for Welcome {
    async fn activate(&mut self, cx: ExtensionContext) -> anyhow::Result<Exports> {
        let launches = cx.api.storage.get_as::<u64>("launches").await?.unwrap_or(0) + 1;
        cx.api.storage.set("launches", &launches).await?;

        cx.api.commands.register("show", "Show Welcome", Some("Harbor")).await?;
        cx.api
            .ui
            .register_status_bar_item(json!({"text": format!("Harbor ({launches})"), "alignment": "left"}))
            .await?;
        cx.api
            .ui
            .show_notification(&format!("Welcome to Harbor! Launch #{launches}."), "info", None)
            .await?;

        cx.console.info(format!("welcome activated (launch {launches})"));
        self.cx = Some(cx);
        Ok(Exports::none().value("launches", launches).function("show"))
    }

    async fn on_event(&mut self, event: &str, data: Value) -> anyhow::Result<()> {
        if let Some(cx) = &self.cx {
            cx.console.debug(format!("saw {event}"));
            cx.emit("welcome.seen", json!({"event": event, "data": data}));
        }
        Ok(())
    }
}

pub fn modules() -> NativeModules {
    NativeModules::new().with(NAME, || Box::<Welcome>::default())
}
