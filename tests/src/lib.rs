mod recon;
