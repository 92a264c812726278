use serde::Serialize;

use crate::model::{
    ImageryArtifact, RenderArtifact, ScriptArtifact, StageArtifact, SubtitleStyle, VoiceArtifact,
};

use super::Stage;

/// これまでに完了したステージの成果物の蓄積。
///
/// 書き込みはオーケストレーターだけが行う。外部には参照として公開する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineState {
    script: Option<ScriptArtifact>,
    imagery: Option<ImageryArtifact>,
    subtitle_style: Option<SubtitleStyle>,
    voice: Option<VoiceArtifact>,
    render: Option<RenderArtifact>,
}

impl PipelineState {
    #[must_use]
    pub fn script(&self) -> Option<&ScriptArtifact> {
        self.script.as_ref()
    }

    #[must_use]
    pub fn imagery(&self) -> Option<&ImageryArtifact> {
        self.imagery.as_ref()
    }

    #[must_use]
    pub fn subtitle_style(&self) -> Option<&SubtitleStyle> {
        self.subtitle_style.as_ref()
    }

    #[must_use]
    pub fn voice(&self) -> Option<&VoiceArtifact> {
        self.voice.as_ref()
    }

    #[must_use]
    pub fn render(&self) -> Option<&RenderArtifact> {
        self.render.as_ref()
    }

    /// 指定ステージの成果物が揃っているか。`Done` は常に false。
    #[must_use]
    pub fn has(&self, stage: Stage) -> bool {
        match stage {
            Stage::Script => self.script.is_some(),
            Stage::Imagery => self.imagery.is_some(),
            Stage::SubtitleStyle => self.subtitle_style.is_some(),
            Stage::Voice => self.voice.is_some(),
            Stage::Render => self.render.is_some(),
            Stage::Done => false,
        }
    }

    /// 成果物を対応するフィールドに書き込む。他のフィールドには触れない。
    pub(crate) fn merge(&mut self, artifact: StageArtifact) -> Stage {
        match artifact {
            StageArtifact::Script(script) => {
                self.script = Some(script);
                Stage::Script
            }
            StageArtifact::Imagery(imagery) => {
                self.imagery = Some(imagery);
                Stage::Imagery
            }
            StageArtifact::SubtitleStyle(style) => {
                self.subtitle_style = Some(style);
                Stage::SubtitleStyle
            }
            StageArtifact::Voice(voice) => {
                self.voice = Some(voice);
                Stage::Voice
            }
            StageArtifact::Render(render) => {
                self.render = Some(render);
                Stage::Render
            }
        }
    }
}
