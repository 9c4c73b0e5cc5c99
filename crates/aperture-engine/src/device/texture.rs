use std::collections::HashMap;

use crate::coords::Extent;
use crate::frame::{CameraFrame, FrameId, FrameSource};

use super::{
    ContextIdentity, CurrentContext, Driver, DriverError, GraphicsError, TextureId, TextureTarget,
};

/// Handle to a GPU texture owned by a [`TextureRegistry`].
///
/// Plain data, like the integer name it wraps: holding one does not keep the
/// texture alive, and using it after release is detected, not prevented.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Texture {
    handle: TextureId,
    target: TextureTarget,
    owner: ContextIdentity,
}

impl Texture {
    pub fn handle(&self) -> TextureId {
        self.handle
    }

    pub fn target(&self) -> TextureTarget {
        self.target
    }

    /// Context that created this texture.
    pub fn owner(&self) -> ContextIdentity {
        self.owner
    }
}

/// What a live texture currently holds.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TextureState {
    /// A frame has been attached since creation.
    pub bound: bool,
    pub frame: Option<FrameId>,
    pub extent: Option<Extent>,
}

/// Allocates, tracks and releases the textures camera frames are bound to.
#[derive(Debug, Default)]
pub struct TextureRegistry {
    live: HashMap<(ContextIdentity, TextureId), (Texture, TextureState)>,
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new texture in the current context.
    pub fn create<D: Driver>(
        &mut self,
        current: &mut CurrentContext<'_, D>,
        target: TextureTarget,
    ) -> Result<Texture, GraphicsError> {
        let owner = current.identity();
        let context = current.context_id();

        let handle = current.driver().create_texture(context, target).map_err(|e| match e {
            DriverError::BadContext | DriverError::NotInitialized(_) => {
                GraphicsError::precondition(format!("no usable current context: {e}"))
            }
            other => GraphicsError::TextureAllocation(other.to_string()),
        })?;

        if self.live.contains_key(&(owner, handle)) {
            // A driver handing out a live name again would alias two frames.
            current.driver().delete_texture(context, handle);
            return Err(GraphicsError::TextureAllocation(format!(
                "driver returned {handle:?}, which is still live in {owner}"
            )));
        }

        let texture = Texture { handle, target, owner };
        self.live.insert((owner, handle), (texture, TextureState::default()));
        log::debug!("texture {handle:?} ({target:?}) created in {owner}");
        Ok(texture)
    }

    /// Releases `texture`. It must belong to the current context and still be live.
    pub fn destroy<D: Driver>(
        &mut self,
        current: &mut CurrentContext<'_, D>,
        texture: Texture,
    ) -> Result<(), GraphicsError> {
        self.check_owned(current, &texture)?;
        self.live.remove(&(texture.owner, texture.handle));

        let context = current.context_id();
        current.driver().delete_texture(context, texture.handle);
        log::debug!("texture {:?} destroyed in {}", texture.handle, texture.owner);
        Ok(())
    }

    /// Attaches the latest frame from `source` to `texture`.
    ///
    /// Returns `Ok(None)` when no frame is pending. A frame that cannot be
    /// attached is dropped and reported as [`GraphicsError::FrameBind`]; the
    /// texture keeps its previous contents.
    pub fn bind_frame<D: Driver, S: FrameSource + ?Sized>(
        &mut self,
        current: &mut CurrentContext<'_, D>,
        texture: &Texture,
        source: &S,
    ) -> Result<Option<FrameId>, GraphicsError> {
        self.check_owned(current, texture)?;

        let Some(frame) = source.take_latest() else {
            return Ok(None);
        };

        let result = frame
            .validate()
            .map_err(|e| GraphicsError::FrameBind(e.to_string()))
            .and_then(|()| {
                let context = current.context_id();
                current
                    .driver()
                    .upload_frame(context, texture.handle, &frame)
                    .map_err(|e| GraphicsError::FrameBind(format!("frame {}: {e}", frame.id())))
            });

        if let Err(err) = result {
            log::warn!("dropping frame {}: {err}", frame.id());
            return Err(err);
        }

        if let Some((_, state)) = self.live.get_mut(&(texture.owner, texture.handle)) {
            state.bound = true;
            state.frame = Some(frame.id());
            state.extent = Some(frame.extent());
        }
        log::trace!("frame {} bound to {:?}", frame.id(), texture.handle);
        Ok(Some(frame.id()))
    }

    /// Copies the frame last bound to `texture` back into a packed
    /// [`CameraFrame`] carrying that frame's id.
    pub fn read_back<D: Driver>(
        &self,
        current: &mut CurrentContext<'_, D>,
        texture: &Texture,
    ) -> Result<CameraFrame, GraphicsError> {
        self.check_owned(current, texture)?;
        let Some(frame) = self.state(texture).and_then(|s| s.frame) else {
            return Err(GraphicsError::Snapshot(format!(
                "texture {:?} holds no frame",
                texture.handle
            )));
        };

        let context = current.context_id();
        let image = current
            .driver()
            .read_back(context, texture.handle)
            .map_err(|e| GraphicsError::Snapshot(format!("reading back frame {frame}: {e}")))?;
        log::debug!("frame {frame} read back from {:?} ({})", texture.handle, image.extent);
        Ok(CameraFrame::new(frame, image.extent, image.format, image.data))
    }

    /// Releases every texture created by the current context. Returns how many
    /// were released.
    pub fn release_all<D: Driver>(&mut self, current: &mut CurrentContext<'_, D>) -> usize {
        let owner = current.identity();
        let context = current.context_id();

        let mut released = 0;
        self.live.retain(|(o, handle), _| {
            if *o != owner {
                return true;
            }
            current.driver().delete_texture(context, *handle);
            released += 1;
            false
        });

        if released > 0 {
            log::debug!("released {released} texture(s) of {owner}");
        }
        released
    }

    /// Forgets textures of a context that can no longer be made current.
    /// The driver reclaims them with the context.
    pub fn abandon(&mut self, owner: ContextIdentity) -> usize {
        let before = self.live.len();
        self.live.retain(|(o, _), _| *o != owner);
        let abandoned = before - self.live.len();
        if abandoned > 0 {
            log::warn!("abandoned {abandoned} texture(s) of unreachable {owner}");
        }
        abandoned
    }

    pub fn state(&self, texture: &Texture) -> Option<TextureState> {
        self.live.get(&(texture.owner, texture.handle)).map(|(_, s)| *s)
    }

    pub fn is_live(&self, texture: &Texture) -> bool {
        self.live.contains_key(&(texture.owner, texture.handle))
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn check_owned<D: Driver>(
        &self,
        current: &CurrentContext<'_, D>,
        texture: &Texture,
    ) -> Result<(), GraphicsError> {
        if texture.owner != current.identity() {
            return Err(GraphicsError::stale(format!(
                "texture {:?} belongs to {}, not the current {}",
                texture.handle,
                texture.owner,
                current.identity()
            )));
        }
        if !self.is_live(texture) {
            return Err(GraphicsError::stale(format!(
                "texture {:?} of {} was already released",
                texture.handle, texture.owner
            )));
        }
        Ok(())
    }
}
