//! Generator directory
//!
//! Assembles the full generator list from paginated Enumerate calls.

use crate::codec::{self, EnumeratePage};
use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::types::Generator;

use neo_otp_ctap::OtpCommand;

/// Paginated listing over a [`CommandExecutor`]
pub struct GeneratorDirectory<'a> {
    executor: &'a CommandExecutor,
    page_size: u32,
}

impl<'a> GeneratorDirectory<'a> {
    pub fn new(executor: &'a CommandExecutor, page_size: u32) -> Self {
        Self {
            executor,
            page_size: page_size.max(1),
        }
    }

    fn enumerate(&self, index: u64, count: u64) -> Result<EnumeratePage> {
        let payload = codec::enumerate_request(index, Some(count))?;
        self.executor.execute_with(OtpCommand::Enumerate, payload, |reply| {
            codec::parse_enumerate_response(&reply)
        })
    }

    /// Every generator on the token, in index order
    ///
    /// A page the token rejects is skipped and listing goes on with the next
    /// index; communication failures abort the whole listing. An accepted
    /// page without records ends the listing early.
    pub fn list_all(&self) -> Result<Vec<Generator>> {
        let total = self.enumerate(0, 0)?.total;
        let page_size = u64::from(self.page_size);
        let pages = total.div_ceil(page_size);

        let mut generators = Vec::with_capacity(total.min(1024) as usize);

        for n in 0..pages {
            let index = n * page_size;
            match self.enumerate(index, page_size) {
                Ok(page) if page.records.is_empty() => {
                    log::warn!("Token returned no generators at {} of {}", index, total);
                    break;
                }
                Ok(page) => generators.extend(page.records),
                Err(e) if e.is_protocol() => {
                    log::warn!(
                        "Skipping generators {}..{}: {}",
                        index,
                        index.saturating_add(page_size).min(total),
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        log::debug!("Listed {} of {} generators", generators.len(), total);
        Ok(generators)
    }
}
