use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Form,
    Loading,
    Audit,
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenEvent {
    Submit,
    ReportReady,
    RequestFailed,
    Advance,
    Restart,
}

impl Screen {
    pub fn as_str(self) -> &'static str {
        match self {
            Screen::Form => "form",
            Screen::Loading => "loading",
            Screen::Audit => "audit",
            Screen::Report => "report",
        }
    }

    // Total over (screen, event); events that do not apply leave the screen
    // unchanged.
    pub fn apply(self, event: ScreenEvent) -> Screen {
        match (self, event) {
            (_, ScreenEvent::Restart) => Screen::Form,
            (Screen::Form, ScreenEvent::Submit) => Screen::Loading,
            (Screen::Loading, ScreenEvent::ReportReady) => Screen::Audit,
            (Screen::Loading, ScreenEvent::RequestFailed) => Screen::Form,
            (Screen::Audit, ScreenEvent::Advance) => Screen::Report,
            (current, _) => current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_report() {
        let screen = Screen::Form
            .apply(ScreenEvent::Submit)
            .apply(ScreenEvent::ReportReady)
            .apply(ScreenEvent::Advance);
        assert_eq!(screen, Screen::Report);
    }

    #[test]
    fn failed_request_returns_to_form() {
        let screen = Screen::Form
            .apply(ScreenEvent::Submit)
            .apply(ScreenEvent::RequestFailed);
        assert_eq!(screen, Screen::Form);
    }

    #[test]
    fn restart_resets_every_screen() {
        for screen in [Screen::Form, Screen::Loading, Screen::Audit, Screen::Report] {
            assert_eq!(screen.apply(ScreenEvent::Restart), Screen::Form);
        }
    }

    #[test]
    fn report_is_unreachable_without_data() {
        assert_eq!(Screen::Form.apply(ScreenEvent::Advance), Screen::Form);
        assert_eq!(Screen::Form.apply(ScreenEvent::ReportReady), Screen::Form);
        assert_eq!(Screen::Loading.apply(ScreenEvent::Advance), Screen::Loading);
    }

    #[test]
    fn screen_tags_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&Screen::Loading).unwrap(),
            "\"loading\""
        );
        assert_eq!(Screen::Audit.as_str(), "audit");
    }
}
