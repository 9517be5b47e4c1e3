use super::{
    ActiveTheme, AnyElement, AppView, Button, ButtonVariants, Context, IntoElement, ObjectFit,
    ParentElement, SharedString, Styled, StyledImage, div, h_flex, img, px, v_flex,
};
use crate::classifier::ClassifierMode;

impl AppView {
    pub(super) fn render_main(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let display = self.config.display;
        let frame_view: AnyElement = if let Some(image) = &self.latest_image {
            img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element()
        } else {
            div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Waiting for frames...")
                .into_any_element()
        };

        let camera_shell = div()
            .w(px(display.width as f32))
            .h(px(display.height as f32))
            .overflow_hidden()
            .rounded_lg()
            .bg(gpui::rgb(0x000000))
            .child(frame_view);

        let (loop_text, running) = match &self.pipeline {
            Some(pipeline) => (
                format!("loop {}", pipeline.handle.state().label()),
                pipeline.handle.is_running(),
            ),
            None => ("no frame source".to_string(), false),
        };
        let status_color = {
            let theme = cx.theme();
            if running {
                theme.success
            } else {
                theme.muted_foreground
            }
        };

        let pose_text = match self.latest_pose_score {
            Some(score) => format!("pose score {:.2}", score),
            None => "no pose".to_string(),
        };
        let mode = self.counter.mode();
        let mode_text = format!("{} (counter {})", mode.describe(), self.counter.get());
        let event_text = match mode {
            ClassifierMode::Off => "--".to_string(),
            _ => self.latest_event.clone().unwrap_or_else(|| "--".to_string()),
        };

        let controls = h_flex()
            .gap_2()
            .child(
                Button::new(SharedString::from("loop-toggle"))
                    .outline()
                    .label(if running { "Stop" } else { "Start" })
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.toggle_running();
                        cx.notify();
                    })),
            )
            .child(
                Button::new(SharedString::from("label-next"))
                    .outline()
                    .label("Next label")
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.next_label();
                        cx.notify();
                    })),
            )
            .child(
                Button::new(SharedString::from("label-off"))
                    .outline()
                    .label("Classifier off")
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.reset_label();
                        cx.notify();
                    })),
            );

        let mut clear_row = h_flex().gap_2();
        if let ClassifierMode::Train { label } = mode {
            clear_row = clear_row.child(
                Button::new(SharedString::from("clear-class"))
                    .outline()
                    .label(format!("Clear class {label}"))
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.clear_examples(false);
                        cx.notify();
                    })),
            );
        }
        clear_row = clear_row.child(
            Button::new(SharedString::from("clear-all"))
                .outline()
                .label("Clear all examples")
                .on_click(cx.listener(|this, _, _, cx| {
                    this.clear_examples(true);
                    cx.notify();
                })),
        );

        let mut camera_row = h_flex().gap_2();
        if self.cameras.len() > 1 {
            for (index, label) in self.cameras.clone() {
                let selected = index == self.camera_index;
                camera_row = camera_row.child(
                    Button::new(SharedString::from(format!("camera-{index}")))
                        .outline()
                        .label(if selected {
                            format!("● {label}")
                        } else {
                            label
                        })
                        .on_click(cx.listener(move |this, _, _, cx| {
                            this.switch_camera(index);
                            cx.notify();
                        })),
                );
            }
        }

        let mut side_panel = v_flex()
            .gap_3()
            .p_4()
            .w(px(320.0))
            .rounded_lg()
            .bg(gpui::rgb(0x0f1419))
            .child(div().text_sm().text_color(status_color).child(loop_text))
            .child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0xa0aab8))
                    .child(format!("{pose_text}, {} frames", self.frames_seen)),
            )
            .child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0xa0aab8))
                    .child(mode_text),
            )
            .child(div().text_base().child(event_text))
            .child(controls)
            .child(clear_row)
            .child(camera_row);

        if let Some(err) = &self.error {
            side_panel = side_panel.child(
                div()
                    .p_3()
                    .rounded_lg()
                    .bg(gpui::rgba(0xef444433))
                    .border_1()
                    .border_color(gpui::rgba(0xef4444ff))
                    .text_xs()
                    .text_color(gpui::rgb(0xfca5a5))
                    .child(err.clone()),
            );
        }

        v_flex()
            .size_full()
            .bg(gpui::rgb(0x1a2332))
            .child(
                h_flex()
                    .flex_1()
                    .gap_3()
                    .p_4()
                    .items_start()
                    .child(camera_shell)
                    .child(side_panel),
            )
            .into_any_element()
    }
}
