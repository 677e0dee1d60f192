/*!
Drive a form page through its dropdown-driven states over the Chrome DevTools
Protocol (CDP) and capture a full-page screenshot of each one.

The crate launches its own headless Chrome, opens a tab, and exposes just
enough of CDP to navigate, pick `<select>` controls by name or accessible
label, change their value as a user would, and write PNG captures to disk.

# Example

```no_run
use anyhow::Result;
use cdp_form_shot::{Browser, ControlLocator};

#[tokio::main]
async fn main() -> Result<()> {
    let browser = Browser::new().await?;
    let tab = browser.new_tab().await?;

    tab.goto("http://localhost:3004/").await?;
    tab.find_control(ControlLocator::named("type").first())
        .await?
        .select_value("dog")
        .await?;
    tab.screenshot_to("screenshots/dog.png").await?;

    browser.close()?;
    Ok(())
}
```
*/

mod browser;
mod element;
mod tab;
mod transport;
mod transport_actor;
mod types;
mod utils;

pub use browser::{Browser, BrowserBuilder};
pub use element::Element;
pub use tab::Tab;
pub use types::{ControlLocator, MatchRule};
